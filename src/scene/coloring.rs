use crate::dataset::AttributeData;

/// One array usable for scalar coloring, merged across every dataset of the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ColoringInfo {
    pub name: String,
    /// Stable index assigned by `finalize_coloring_info`, -1 before.
    pub index: i32,
    pub maximum_number_of_components: usize,
    pub component_names: Vec<String>,
    pub component_ranges: Vec<[f64; 2]>,
    pub magnitude_range: [f64; 2],
}

impl ColoringInfo {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            index: -1,
            maximum_number_of_components: 0,
            component_names: Vec::new(),
            component_ranges: Vec::new(),
            magnitude_range: [f64::INFINITY, f64::NEG_INFINITY],
        }
    }

    /// Human readable name of a coloring component.
    pub fn component_label(&self, component: i32) -> String {
        match component {
            -2 => "Direct Scalars".to_string(),
            -1 => "Magnitude".to_string(),
            c if c >= 0 => self
                .component_names
                .get(c as usize)
                .filter(|name| !name.is_empty())
                .cloned()
                .unwrap_or_else(|| format!("Component #{}", c)),
            _ => "Invalid component".to_string(),
        }
    }

    /// Range used for `component`, the magnitude range for negative components.
    pub fn range(&self, component: i32) -> Option<[f64; 2]> {
        let range = if component < 0 {
            self.magnitude_range
        } else {
            *self.component_ranges.get(component as usize)?
        };
        (range[0] <= range[1]).then_some(range)
    }
}

/// Candidate coloring arrays for the point and cell domains, and the current selection.
///
/// Entries keep their insertion order: the first array seen gets index 0.
#[derive(Debug, Default)]
pub struct ColoringInfoHandler {
    point_data: Vec<ColoringInfo>,
    cell_data: Vec<ColoringInfo>,
    current: Option<usize>,
    current_using_cell_data: bool,
}

impl ColoringInfoHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self, use_cell_data: bool) -> &Vec<ColoringInfo> {
        if use_cell_data {
            &self.cell_data
        } else {
            &self.point_data
        }
    }

    pub fn clear_coloring_info(&mut self) {
        self.point_data.clear();
        self.cell_data.clear();
        self.current = None;
    }

    /// Merges the arrays of one attribute set, widening ranges and reconciling component names.
    pub fn update_coloring_info(&mut self, attributes: &AttributeData, use_cell_data: bool) {
        let data = if use_cell_data {
            &mut self.cell_data
        } else {
            &mut self.point_data
        };

        for array in attributes.arrays() {
            let position = match data.iter().position(|info| info.name == array.name()) {
                Some(position) => position,
                None => {
                    data.push(ColoringInfo::new(array.name()));
                    data.len() - 1
                }
            };
            let info = &mut data[position];
            let components = array.number_of_components();
            info.maximum_number_of_components = info.maximum_number_of_components.max(components);

            if let Some([lo, hi]) = array.range(-1) {
                info.magnitude_range[0] = info.magnitude_range[0].min(lo);
                info.magnitude_range[1] = info.magnitude_range[1].max(hi);
            }
            for component in 0..components {
                let Some([lo, hi]) = array.range(component as i32) else {
                    continue;
                };
                match info.component_ranges.get_mut(component) {
                    Some(range) => {
                        range[0] = range[0].min(lo);
                        range[1] = range[1].max(hi);
                    }
                    None => info.component_ranges.push([lo, hi]),
                }
            }

            let has_component_name = (0..components).any(|c| array.component_name(c).is_some());
            if has_component_name {
                for component in 0..components {
                    let name = array.component_name(component);
                    match info.component_names.get_mut(component) {
                        Some(existing) => {
                            if name.map(|name| name != existing).unwrap_or(false) {
                                existing.clear();
                            }
                        }
                        None => info
                            .component_names
                            .push(name.unwrap_or_default().to_string()),
                    }
                }
            }
        }
    }

    /// Assigns stable indices in insertion order.
    pub fn finalize_coloring_info(&mut self, use_cell_data: bool) {
        let data = if use_cell_data {
            &mut self.cell_data
        } else {
            &mut self.point_data
        };
        for (index, info) in data.iter_mut().enumerate() {
            info.index = index as i32;
        }
    }

    /// Selects the coloring array. Without a name the first array is used;
    /// an unknown name disables coloring with a warning unless `quiet`.
    pub fn set_current_coloring(
        &mut self,
        enable: bool,
        use_cell_data: bool,
        array_name: Option<&str>,
        quiet: bool,
    ) -> Option<&ColoringInfo> {
        self.current_using_cell_data = use_cell_data;
        let count = self.data(use_cell_data).len();

        self.current = if !enable {
            None
        } else if count == 0 {
            if !quiet {
                log::debug!("No array to color with");
            }
            None
        } else if let Some(name) = array_name {
            let found = self.data(use_cell_data).iter().position(|info| info.name == name);
            if found.is_none() && !quiet {
                log::warn!("Unknown scalar array: \"{}\"", name);
            }
            found
        } else {
            Some(0)
        };
        self.current_coloring_info()
    }

    pub fn current_coloring_info(&self) -> Option<&ColoringInfo> {
        self.data(self.current_using_cell_data).get(self.current?)
    }

    /// Index of the current selection, -1 when not coloring.
    pub fn current_index(&self) -> i32 {
        self.current.map(|index| index as i32).unwrap_or(-1)
    }

    pub fn current_using_cell_data(&self) -> bool {
        self.current_using_cell_data
    }

    /// Advances the selection. With `cycle_to_non_coloring` the sequence passes
    /// through "no coloring" after the last array, otherwise it wraps to the first.
    pub fn cycle_coloring_array(&mut self, cycle_to_non_coloring: bool) {
        let count = self.data(self.current_using_cell_data).len();
        self.current = match self.current {
            None => (count > 0).then_some(0),
            Some(index) if index + 1 < count => Some(index + 1),
            Some(_) if cycle_to_non_coloring || count == 0 => None,
            Some(_) => Some(0),
        };
    }

    /// Switches between point and cell arrays, keeping the index.
    pub fn cycle_coloring_field(&mut self) {
        self.current_using_cell_data = !self.current_using_cell_data;
    }

    pub fn info_for_coloring(&self, use_cell_data: bool, index: i32) -> Option<&ColoringInfo> {
        if index < 0 {
            return None;
        }
        self.data(use_cell_data).get(index as usize)
    }

    pub fn number_of_indexes_for_coloring(&self, use_cell_data: bool) -> usize {
        self.data(use_cell_data).len()
    }

    pub fn find_index_for_coloring(&self, use_cell_data: bool, name: &str) -> Option<usize> {
        self.data(use_cell_data).iter().position(|info| info.name == name)
    }

    pub fn array_names(&self, use_cell_data: bool) -> Vec<&str> {
        self.data(use_cell_data)
            .iter()
            .map(|info| info.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::ColoringInfoHandler;
    use crate::dataset::{AttributeData, DataArray};

    fn attributes(arrays: Vec<DataArray>) -> AttributeData {
        let mut data = AttributeData::new();
        for array in arrays {
            data.add_array(array);
        }
        data
    }

    fn handler_with(names: &[&str]) -> ColoringInfoHandler {
        let mut handler = ColoringInfoHandler::new();
        let arrays = names
            .iter()
            .map(|name| DataArray::new(*name, 1, vec![0.0, 1.0]).unwrap())
            .collect();
        handler.update_coloring_info(&attributes(arrays), false);
        handler.finalize_coloring_info(false);
        handler
    }

    #[test]
    fn merged_ranges_only_widen() {
        let mut handler = ColoringInfoHandler::new();
        let a = attributes(vec![DataArray::new("temp", 1, vec![0.0, 10.0]).unwrap()]);
        let b = attributes(vec![DataArray::new("temp", 1, vec![-5.0, 20.0]).unwrap()]);
        handler.update_coloring_info(&a, false);
        handler.update_coloring_info(&b, false);
        handler.finalize_coloring_info(false);

        let info = handler.info_for_coloring(false, 0).unwrap();
        assert_eq!(info.component_ranges[0], [-5.0, 20.0]);
        assert_eq!(info.magnitude_range, [0.0, 20.0]);

        handler.update_coloring_info(&a, false);
        let info = handler.info_for_coloring(false, 0).unwrap();
        assert_eq!(info.component_ranges[0], [-5.0, 20.0]);
    }

    #[test]
    fn new_components_append_and_conflicting_names_collapse() {
        let mut handler = ColoringInfoHandler::new();
        let first = DataArray::new("vel", 2, vec![1.0, 2.0])
            .unwrap()
            .with_component_names(vec!["X".into(), "Y".into()]);
        let second = DataArray::new("vel", 3, vec![0.0, 5.0, 9.0])
            .unwrap()
            .with_component_names(vec!["X".into(), "V".into(), "Z".into()]);
        handler.update_coloring_info(&attributes(vec![first]), true);
        handler.update_coloring_info(&attributes(vec![second]), true);

        let info = &handler.cell_data[0];
        assert_eq!(info.maximum_number_of_components, 3);
        assert_eq!(info.component_ranges, vec![[0.0, 1.0], [2.0, 5.0], [9.0, 9.0]]);
        assert_eq!(info.component_names, vec!["X", "", "Z"]);
        assert_eq!(info.component_label(1), "Component #1");
        assert_eq!(info.component_label(2), "Z");
        assert_eq!(info.component_label(-1), "Magnitude");
    }

    #[test]
    fn selection_by_name_and_default() {
        let mut handler = handler_with(&["height", "temp"]);
        assert_eq!(
            handler.set_current_coloring(true, false, None, false).map(|i| i.name.clone()),
            Some("height".to_string())
        );
        assert_eq!(handler.set_current_coloring(true, false, Some("temp"), false).map(|i| i.index), Some(1));
        assert!(handler.set_current_coloring(true, false, Some("missing"), false).is_none());
        assert_eq!(handler.current_index(), -1);
        assert!(handler.set_current_coloring(false, false, Some("temp"), false).is_none());
        assert!(handler.set_current_coloring(true, true, None, false).is_none());
    }

    #[test]
    fn cycling_through_non_coloring() {
        let mut handler = handler_with(&["a", "b"]);
        handler.set_current_coloring(false, false, None, true);
        let mut sequence = Vec::new();
        for _ in 0..4 {
            handler.cycle_coloring_array(true);
            sequence.push(handler.current_index());
        }
        assert_eq!(sequence, vec![0, 1, -1, 0]);

        handler.set_current_coloring(true, false, Some("b"), true);
        handler.cycle_coloring_array(false);
        assert_eq!(handler.current_index(), 0);
        handler.cycle_coloring_array(false);
        assert_eq!(handler.current_index(), 1);
        handler.cycle_coloring_array(false);
        assert_eq!(handler.current_index(), 0);
    }

    #[test]
    fn lookups_by_name() {
        let handler = handler_with(&["a", "b"]);
        assert_eq!(handler.find_index_for_coloring(false, "b"), Some(1));
        assert_eq!(handler.find_index_for_coloring(true, "b"), None);
        assert_eq!(handler.number_of_indexes_for_coloring(false), 2);
        assert_eq!(handler.array_names(false), vec!["a", "b"]);
        assert!(handler.info_for_coloring(false, 2).is_none());
    }
}
