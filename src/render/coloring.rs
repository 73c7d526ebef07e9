//! Renderer specialization choosing, per actor, between the original
//! surface, its scalar colored copy, its point sprites and its volume, and
//! keeping every visible mapper in sync with the current coloring selection.

use std::sync::Arc;

use super::colormap::{ColorTransferFunction, OpacityFunction};
use super::dirty::Node;
use super::raster::Layer;
use super::renderer::Renderer;
use crate::dataset::{AttributeData, ImageData};
use crate::options::Options;
use crate::scene::coloring::ColoringInfo;
use crate::scene::variants::{ColorMode, Mapper, VectorMode, VolumeMapper};
use crate::scene::MetaImporter;

/// Step applied by [`ColoringRenderer::cycle_scalars`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleType {
    None,
    Field,
    ArrayIndex,
    Component,
}

/// Colour legend of the current coloring.
#[derive(Debug, Clone)]
pub struct ScalarBar {
    pub title: String,
    pub lookup_table: Arc<ColorTransferFunction>,
    pub range: [f64; 2],
}

#[derive(Debug, Clone, PartialEq)]
struct ColoringRequest {
    enable: bool,
    use_cell_data: bool,
    array_name: Option<String>,
    component: i32,
}

/// Which parts of the coloring were invalidated since the last configuration.
#[derive(Debug, Clone, Copy, Default)]
struct ColoringDirt {
    transfer_function: bool,
    geometry_mappers: bool,
    sprite_mappers: bool,
    volume_mappers: bool,
    scalar_bar: bool,
}

impl ColoringDirt {
    fn all() -> Self {
        Self {
            transfer_function: true,
            geometry_mappers: true,
            sprite_mappers: true,
            volume_mappers: true,
            scalar_bar: true,
        }
    }
}

const COLORING_NODES: [Node; 6] = [
    Node::Coloring,
    Node::ColorTransferFunction,
    Node::ColoringMappers,
    Node::PointSpritesMappers,
    Node::VolumePropsMappers,
    Node::ScalarBarActor,
];

/// `name` cut to `max` characters with an ellipsis.
fn short_name(name: &str, max: usize) -> String {
    if name.chars().count() <= max || max <= 3 {
        return name.to_string();
    }
    let mut short: String = name.chars().take(max - 3).collect();
    short.push_str("...");
    short
}

fn on_off(value: bool) -> &'static str {
    if value {
        "[ON]"
    } else {
        "[OFF]"
    }
}

/// Points `mapper` at `array_name`. Returns false, with scalar visibility
/// off, when the array is missing or cannot be shown with `component`.
pub fn configure_mapper_for_coloring(
    mapper: &mut Mapper,
    attributes: &AttributeData,
    array_name: &str,
    component: i32,
    lookup_table: &Arc<ColorTransferFunction>,
    range: [f64; 2],
    use_cell_data: bool,
) -> bool {
    let Some(array) = attributes.array(array_name) else {
        mapper.scalar_visibility = false;
        return false;
    };
    let components = array.number_of_components() as i32;
    if component >= components || component < -2 {
        mapper.scalar_visibility = false;
        return false;
    }

    mapper.array_name = array_name.to_string();
    mapper.use_cell_data = use_cell_data;
    if component == -2 {
        if components > 4 {
            log::warn!("Direct scalars rendering not supported by array with more than 4 components");
            mapper.scalar_visibility = false;
            return false;
        }
        mapper.color_mode = ColorMode::DirectScalars;
    } else {
        mapper.color_mode = ColorMode::MapScalars;
        mapper.range = range;
        mapper.lookup_table = Some(Arc::clone(lookup_table));
        mapper.vector_mode = if component >= 0 {
            VectorMode::Component(component as usize)
        } else {
            VectorMode::Magnitude
        };
    }
    mapper.scalar_visibility = true;
    true
}

/// Volume mapper for `array_name` of `image`, or `None` when the array
/// cannot be rendered as a volume.
pub fn configure_volume_for_coloring(
    image: &ImageData,
    array_name: &str,
    component: i32,
    color: &Arc<ColorTransferFunction>,
    range: [f64; 2],
    use_cell_data: bool,
    inverse: bool,
) -> Option<VolumeMapper> {
    let attributes = if use_cell_data {
        &image.cell_data
    } else {
        &image.point_data
    };
    let array = attributes.array(array_name)?;
    let components = array.number_of_components() as i32;
    if component >= components || component < -2 {
        return None;
    }
    let vector_mode = match component {
        -2 => {
            if components > 4 {
                log::warn!("Direct scalars rendering not supported by array with more than 4 components");
                return None;
            }
            None
        }
        -1 => Some(VectorMode::Magnitude),
        c => Some(VectorMode::Component(c as usize)),
    };
    Some(VolumeMapper {
        array_name: array_name.to_string(),
        use_cell_data,
        vector_mode,
        color: Arc::clone(color),
        opacity: OpacityFunction { range, inverse },
    })
}

pub struct ColoringRenderer {
    base: Renderer,

    request: ColoringRequest,
    request_pending: bool,
    component: i32,
    colormap: Vec<f64>,
    user_range: Option<Vec<f64>>,
    scalar_bar_requested: bool,
    use_point_sprites: bool,
    use_volume: bool,
    use_inverse_opacity: bool,

    transfer_function: Arc<ColorTransferFunction>,
    color_range: [f64; 2],
    scalar_bar: Option<ScalarBar>,
}

impl Default for ColoringRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ColoringRenderer {
    pub fn new() -> Self {
        Self {
            base: Renderer::new(),
            request: ColoringRequest {
                enable: false,
                use_cell_data: false,
                array_name: None,
                component: -1,
            },
            request_pending: true,
            component: -1,
            colormap: crate::options::DEFAULT_COLORMAP.to_vec(),
            user_range: None,
            scalar_bar_requested: false,
            use_point_sprites: false,
            use_volume: false,
            use_inverse_opacity: false,
            transfer_function: Arc::new(ColorTransferFunction::default()),
            color_range: [0.0, 1.0],
            scalar_bar: None,
        }
    }

    pub fn base(&self) -> &Renderer {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut Renderer {
        &mut self.base
    }

    pub fn apply_options(&mut self, options: &Options) {
        self.base.apply_options(options);
        let scivis = &options.model.scivis;
        self.set_coloring(
            scivis.enable,
            scivis.cells,
            scivis.array_name.clone(),
            scivis.component,
        );
        self.set_colormap(scivis.colormap.clone());
        self.set_scalar_range(scivis.range.clone());
        self.show_scalar_bar(options.ui.scalar_bar);
        self.set_use_point_sprites(options.model.point_sprites.enable);
        self.set_use_volume(options.model.volume.enable);
        self.set_use_inverse_opacity(options.model.volume.inverse);
    }

    fn invalidate(&mut self, nodes: &[Node]) {
        for &node in nodes {
            self.base.mark(node);
        }
    }

    /// Requests a coloring selection, resolved against the scene on the next update.
    pub fn set_coloring(
        &mut self,
        enable: bool,
        use_cell_data: bool,
        array_name: Option<String>,
        component: i32,
    ) {
        let request = ColoringRequest {
            enable,
            use_cell_data,
            array_name,
            component,
        };
        if self.request != request {
            self.request = request;
            self.request_pending = true;
            self.invalidate(&[Node::Coloring]);
        }
    }

    pub fn set_colormap(&mut self, colormap: Vec<f64>) {
        if self.colormap != colormap {
            self.colormap = colormap;
            self.invalidate(&[Node::Coloring]);
        }
    }

    /// A range is used only when it holds exactly two values.
    pub fn set_scalar_range(&mut self, range: Option<Vec<f64>>) {
        if self.user_range != range {
            self.user_range = range;
            self.invalidate(&[Node::Coloring]);
        }
    }

    pub fn show_scalar_bar(&mut self, show: bool) {
        if self.scalar_bar_requested != show {
            self.scalar_bar_requested = show;
            self.invalidate(&[Node::Coloring]);
        }
    }

    pub fn set_use_point_sprites(&mut self, use_sprites: bool) {
        if self.use_point_sprites != use_sprites {
            self.use_point_sprites = use_sprites;
            self.invalidate(&[Node::Coloring, Node::PointSpritesMappers]);
        }
    }

    pub fn set_use_volume(&mut self, use_volume: bool) {
        if self.use_volume != use_volume {
            self.use_volume = use_volume;
            self.invalidate(&[Node::Coloring, Node::VolumePropsMappers]);
        }
    }

    pub fn set_use_inverse_opacity(&mut self, inverse: bool) {
        if self.use_inverse_opacity != inverse {
            self.use_inverse_opacity = inverse;
            self.invalidate(&[Node::Coloring, Node::VolumePropsMappers]);
        }
    }

    pub fn use_volume(&self) -> bool {
        self.use_volume
    }

    pub fn use_point_sprites(&self) -> bool {
        self.use_point_sprites
    }

    pub fn use_inverse_opacity(&self) -> bool {
        self.use_inverse_opacity
    }

    pub fn scalar_bar_requested(&self) -> bool {
        self.scalar_bar_requested
    }

    pub fn component(&self) -> i32 {
        self.component
    }

    pub fn color_range(&self) -> [f64; 2] {
        self.color_range
    }

    pub fn transfer_function(&self) -> &Arc<ColorTransferFunction> {
        &self.transfer_function
    }

    /// The legend, when it is visible.
    pub fn scalar_bar(&self) -> Option<&ScalarBar> {
        self.scalar_bar.as_ref()
    }

    /// A new scene replaces the importer content: the requested coloring is resolved again.
    pub fn scene_loaded(&mut self) {
        self.request_pending = true;
        self.base.scene_changed();
    }

    pub fn array_index(&self, importer: &mut MetaImporter) -> i32 {
        importer.coloring_info_handler().current_index()
    }

    pub fn use_cell_coloring(&self, importer: &mut MetaImporter) -> bool {
        importer.coloring_info_handler().current_using_cell_data()
    }

    /// Name of the array in use, `None` when not coloring.
    pub fn array_name(&self, importer: &mut MetaImporter) -> Option<String> {
        importer
            .coloring_info_handler()
            .current_coloring_info()
            .map(|info| info.name.clone())
    }

    fn apply_request(&mut self, importer: &mut MetaImporter) {
        let request = &self.request;
        importer.coloring_info_handler().set_current_coloring(
            request.enable,
            request.use_cell_data,
            request.array_name.as_deref(),
            false,
        );
        self.component = request.component;
        self.request_pending = false;
        self.invalidate(&[Node::Coloring]);
    }

    /// Which cycle step would bring the selection back to a valid state.
    pub fn check_coloring(&self, importer: &mut MetaImporter) -> CycleType {
        let handler = importer.coloring_info_handler();
        let index = handler.current_index();
        if index == -1 {
            return CycleType::None;
        }
        let cell = handler.current_using_cell_data();
        let Some(info) = handler.info_for_coloring(cell, index) else {
            return CycleType::ArrayIndex;
        };
        if self.component >= info.maximum_number_of_components as i32 {
            return CycleType::Component;
        }
        CycleType::None
    }

    /// Applies one cycle step, then keeps cycling until the selection is valid.
    pub fn cycle_scalars(&mut self, importer: &mut MetaImporter, cycle: CycleType) {
        if self.request_pending {
            self.apply_request(importer);
        }
        self.cycle_once(importer, cycle);
        self.invalidate(&[Node::Coloring]);
    }

    fn cycle_once(&mut self, importer: &mut MetaImporter, cycle: CycleType) {
        let handler = importer.coloring_info_handler();
        match cycle {
            CycleType::None => return,
            CycleType::Field => handler.cycle_coloring_field(),
            CycleType::ArrayIndex => handler.cycle_coloring_array(!self.use_volume),
            CycleType::Component => {
                if let Some(info) = handler.current_coloring_info() {
                    let count = info.maximum_number_of_components as i32 + 2;
                    self.component = (self.component + 3).rem_euclid(count) - 2;
                }
            }
        }
        let next = self.check_coloring(importer);
        self.cycle_once(importer, next);
    }

    /// Colour range and transfer function of `info` for the current component.
    fn configure_range_and_transfer_function(&mut self, info: &ColoringInfo) {
        if self.component == -2 {
            return;
        }
        if self.component >= info.maximum_number_of_components as i32 {
            log::warn!("Invalid component index: {}", self.component);
            return;
        }

        self.color_range = match self.user_range.as_deref() {
            Some(&[lo, hi]) => [lo, hi],
            Some(_) => {
                log::warn!("The range specified does not have exactly 2 values, using automatic range.");
                info.range(self.component).unwrap_or([0.0, 1.0])
            }
            None => info.range(self.component).unwrap_or([0.0, 1.0]),
        };

        let mut transfer_function = None;
        if !self.colormap.is_empty() {
            transfer_function = ColorTransferFunction::from_colormap(&self.colormap, self.color_range);
            if transfer_function.is_none() {
                log::warn!("Specified color map list count is not a multiple of 4, ignoring it.");
            }
        }
        let transfer_function = transfer_function
            .or_else(|| {
                ColorTransferFunction::from_colormap(&[0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0], self.color_range)
            })
            .unwrap_or_default();
        self.transfer_function = Arc::new(transfer_function);
    }

    fn take_dirt(&mut self) -> Option<ColoringDirt> {
        let dirty = &mut self.base.dirty;
        let coloring = dirty.take(Node::Coloring);
        let dirt = ColoringDirt {
            transfer_function: dirty.take(Node::ColorTransferFunction),
            geometry_mappers: dirty.take(Node::ColoringMappers),
            sprite_mappers: dirty.take(Node::PointSpritesMappers),
            volume_mappers: dirty.take(Node::VolumePropsMappers),
            scalar_bar: dirty.take(Node::ScalarBarActor),
        };
        let any = coloring
            || dirt.transfer_function
            || dirt.geometry_mappers
            || dirt.sprite_mappers
            || dirt.volume_mappers
            || dirt.scalar_bar;
        any.then_some(dirt)
    }

    fn configure_coloring(&mut self, importer: &mut MetaImporter, mut dirt: ColoringDirt) {
        let use_raytracing = self.base.use_raytracing();
        let volume_visible = !use_raytracing && self.use_volume;

        let mut info = importer.coloring_info_handler().current_coloring_info().cloned();
        if info.is_none() && volume_visible {
            // Volumes always need an array.
            self.cycle_scalars(importer, CycleType::ArrayIndex);
            // Everything is reconfigured below, drop the nodes the cycle marked.
            let _ = self.take_dirt();
            dirt = ColoringDirt::all();
            info = importer.coloring_info_handler().current_coloring_info().cloned();
        }
        let use_cell_data = importer.coloring_info_handler().current_using_cell_data();

        if let Some(info) = &info {
            if dirt.transfer_function {
                self.configure_range_and_transfer_function(info);
            }
        }

        let geometries_visible = use_raytracing || (!self.use_volume && !self.use_point_sprites);
        let sprites_visible = !use_raytracing && !self.use_volume && self.use_point_sprites;
        let component = self.component;
        let range = self.color_range;
        let lookup_table = Arc::clone(&self.transfer_function);

        for entry in importer.entries_mut() {
            let colored = match &info {
                Some(info) if geometries_visible => {
                    if dirt.geometry_mappers || !entry.coloring.mapper.scalar_visibility {
                        let geometry = Arc::clone(&entry.coloring.geometry);
                        let attributes = if use_cell_data {
                            &geometry.cell_data
                        } else {
                            &geometry.point_data
                        };
                        configure_mapper_for_coloring(
                            &mut entry.coloring.mapper,
                            attributes,
                            &info.name,
                            component,
                            &lookup_table,
                            range,
                            use_cell_data,
                        )
                    } else {
                        entry.coloring.mapper.scalar_visibility
                    }
                }
                _ => {
                    entry.coloring.mapper.scalar_visibility = false;
                    false
                }
            };
            entry.coloring.visible = colored;
            entry.visible = geometries_visible && !colored;

            entry.point_sprites.visible = sprites_visible;
            match &info {
                Some(info) if sprites_visible => {
                    if dirt.sprite_mappers || !entry.point_sprites.mapper.scalar_visibility {
                        let geometry = Arc::clone(&entry.point_sprites.geometry);
                        let attributes = if use_cell_data {
                            &geometry.cell_data
                        } else {
                            &geometry.point_data
                        };
                        configure_mapper_for_coloring(
                            &mut entry.point_sprites.mapper,
                            attributes,
                            &info.name,
                            component,
                            &lookup_table,
                            range,
                            use_cell_data,
                        );
                    }
                }
                _ => entry.point_sprites.mapper.scalar_visibility = false,
            }
        }

        let inverse = self.use_inverse_opacity;
        for volume in importer.volumes_mut() {
            if !volume_visible {
                volume.visible = false;
                continue;
            }
            if dirt.volume_mappers || volume.mapper.is_none() {
                volume.mapper = info.as_ref().and_then(|info| {
                    configure_volume_for_coloring(
                        &volume.image,
                        &info.name,
                        component,
                        &lookup_table,
                        range,
                        use_cell_data,
                        inverse,
                    )
                });
            }
            if volume.mapper.is_none() {
                log::error!("Cannot use volume with this dataset or with the requested array");
            }
            volume.visible = volume.mapper.is_some();
        }

        let bar_visible = self.scalar_bar_requested && info.is_some() && component >= -1;
        match &info {
            Some(info) if bar_visible => {
                if dirt.scalar_bar || self.scalar_bar.is_none() {
                    self.scalar_bar = Some(ScalarBar {
                        title: format!("{} ({})", info.name, info.component_label(component)),
                        lookup_table: Arc::clone(&self.transfer_function),
                        range: self.color_range,
                    });
                }
            }
            _ => self.scalar_bar = None,
        }

        self.base.mark(Node::RenderPasses);
        self.base.set_scene_modified();
    }

    /// Configures everything that was invalidated since the last call.
    pub fn update(&mut self, importer: &mut MetaImporter) {
        if self.request_pending {
            self.apply_request(importer);
        }
        self.base.track_importer(importer);
        for node in Node::ALL {
            if node == Node::CheatSheet {
                continue;
            }
            if COLORING_NODES.contains(&node) {
                if node == Node::Coloring {
                    if let Some(dirt) = self.take_dirt() {
                        self.configure_coloring(importer, dirt);
                    }
                }
                continue;
            }
            if self.base.dirty.take(node) {
                self.base.configure_node(node, importer);
            }
        }
    }

    /// Updates then renders the scene.
    pub fn render_frame(
        &mut self,
        importer: &mut MetaImporter,
        width: u32,
        height: u32,
        with_background: bool,
        ui_only: bool,
    ) -> Layer {
        self.update(importer);
        self.base
            .render_frame(importer, width, height, with_background, ui_only)
    }

    pub fn coloring_description(&self, importer: &mut MetaImporter) -> String {
        let handler = importer.coloring_info_handler();
        match handler.current_coloring_info() {
            Some(info) => format!(
                "Coloring using {} array named {}, {}\n",
                if handler.current_using_cell_data() { "cell" } else { "point" },
                info.name,
                info.component_label(self.component)
            ),
            None => "Not coloring\n".to_string(),
        }
    }

    /// Coloring state lines of the cheat sheet.
    pub fn cheat_sheet_lines(&self, importer: &mut MetaImporter) -> Vec<String> {
        let handler = importer.coloring_info_handler();
        let info = handler.current_coloring_info();
        let component = match info {
            Some(info) => info.component_label(self.component),
            None => match self.component {
                -2 => "Direct Scalars".to_string(),
                -1 => "Magnitude".to_string(),
                _ => String::new(),
            },
        };
        vec![
            format!(
                " C: Cell scalars coloring {}",
                on_off(handler.current_using_cell_data())
            ),
            format!(
                " S: Scalars coloring [{}]",
                info.map(|info| short_name(&info.name, 19))
                    .unwrap_or_else(|| "OFF".to_string())
            ),
            format!(" Y: Coloring component [{}]", component),
            format!(" B: Scalar bar {}", on_off(self.scalar_bar_requested)),
            format!(" V: Volume representation {}", on_off(self.use_volume)),
            format!(" I: Inverse volume opacity {}", on_off(self.use_inverse_opacity)),
            format!(" O: Point sprites {}", on_off(self.use_point_sprites)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::{short_name, ColoringRenderer, CycleType};
    use crate::dataset::{DataArray, Dataset, ImageData, PolyData};
    use crate::importer::GenericImporter;
    use crate::readers::{GeometryReader, ReaderError};
    use crate::scene::variants::{ColorMode, VectorMode};
    use crate::scene::MetaImporter;
    use glam::Vec3;
    use std::sync::Arc;

    struct Fixed(Dataset);

    impl GeometryReader for Fixed {
        fn read(&mut self) -> Result<Dataset, ReaderError> {
            Ok(self.0.clone())
        }

        fn description(&self) -> String {
            "fixed".to_string()
        }
    }

    fn array(name: &str, components: usize, values: Vec<f64>) -> DataArray {
        DataArray::new(name, components, values).unwrap_or_else(|err| panic!("{err}"))
    }

    fn importer_for(dataset: Dataset) -> MetaImporter {
        let mut importer = MetaImporter::new();
        importer.add_importer(Box::new(GenericImporter::new(Box::new(Fixed(dataset)))));
        importer
            .update(&mut |_| {})
            .unwrap_or_else(|err| panic!("{err}"));
        importer
    }

    fn height_triangle() -> MetaImporter {
        let mut poly = PolyData::new(vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]);
        poly.polys = vec![vec![0, 1, 2]];
        poly.point_data.add_array(array("height", 1, vec![0.0, 0.5, 1.0]));
        poly.point_data
            .add_array(array("velocity", 3, vec![1.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 3.0]));
        poly.cell_data.add_array(array("id", 1, vec![7.0]));
        importer_for(Dataset::Poly(Arc::new(poly)))
    }

    fn density_volume() -> MetaImporter {
        let mut image = ImageData::new([2, 2, 2], Vec3::ONE, Vec3::ZERO);
        image
            .point_data
            .add_array(array("density", 1, (0..8).map(f64::from).collect()));
        importer_for(Dataset::Image(Arc::new(image)))
    }

    #[test]
    fn invalid_component_is_corrected_by_cycling() {
        let mut importer = height_triangle();
        let mut renderer = ColoringRenderer::new();
        renderer.set_coloring(true, false, None, -1);
        renderer.show_scalar_bar(true);
        renderer.update(&mut importer);
        assert_eq!(renderer.array_index(&mut importer), 0);
        assert_eq!(renderer.array_name(&mut importer).as_deref(), Some("height"));

        let entry = &importer.entries()[0];
        assert!(entry.coloring.visible);
        assert!(!entry.visible);
        assert_eq!(entry.coloring.mapper.vector_mode, VectorMode::Magnitude);
        assert_eq!(entry.coloring.mapper.range, [0.0, 1.0]);
        assert!(entry.coloring.mapper.lookup_table.is_some());
        let bar = renderer.scalar_bar().unwrap_or_else(|| panic!("scalar bar expected"));
        assert_eq!(bar.title, "height (Magnitude)");

        renderer.set_coloring(true, false, None, 5);
        renderer.update(&mut importer);
        let next = renderer.check_coloring(&mut importer);
        assert_eq!(next, CycleType::Component);
        renderer.cycle_scalars(&mut importer, next);
        assert!((-2..=0).contains(&renderer.component()));
        assert_eq!(renderer.check_coloring(&mut importer), CycleType::None);
    }

    #[test]
    fn selection_stays_valid_through_any_cycle_sequence() {
        let mut importer = height_triangle();
        let mut renderer = ColoringRenderer::new();
        renderer.set_coloring(true, false, Some("velocity".into()), 2);
        renderer.update(&mut importer);

        let steps = [
            CycleType::Component,
            CycleType::ArrayIndex,
            CycleType::Field,
            CycleType::Component,
            CycleType::ArrayIndex,
            CycleType::Field,
            CycleType::ArrayIndex,
            CycleType::Component,
            CycleType::Component,
            CycleType::ArrayIndex,
        ];
        for step in steps.into_iter().cycle().take(60) {
            renderer.cycle_scalars(&mut importer, step);
            let index = renderer.array_index(&mut importer);
            let cell = renderer.use_cell_coloring(&mut importer);
            let component = renderer.component();
            if index != -1 {
                let info = importer
                    .coloring_info_handler()
                    .info_for_coloring(cell, index)
                    .unwrap_or_else(|| panic!("dangling index {index}"))
                    .clone();
                assert!(
                    component == -2
                        || component == -1
                        || (component >= 0 && (component as usize) < info.maximum_number_of_components),
                    "component {component} invalid for {}",
                    info.name
                );
            }
            renderer.update(&mut importer);
        }
    }

    #[test]
    fn field_cycle_into_an_empty_domain_stops_coloring() {
        let mut poly = PolyData::new(vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]);
        poly.polys = vec![vec![0, 1, 2]];
        poly.point_data.add_array(array("height", 1, vec![0.0, 0.5, 1.0]));
        let mut importer = importer_for(Dataset::Poly(Arc::new(poly)));
        let mut renderer = ColoringRenderer::new();
        renderer.set_coloring(true, false, None, -1);
        renderer.update(&mut importer);
        assert_eq!(renderer.array_index(&mut importer), 0);

        renderer.cycle_scalars(&mut importer, CycleType::Field);
        assert!(renderer.use_cell_coloring(&mut importer));
        assert_eq!(renderer.array_index(&mut importer), -1);
        assert_eq!(renderer.check_coloring(&mut importer), CycleType::None);
        renderer.update(&mut importer);
        assert!(importer.entries()[0].visible);
        assert!(!importer.entries()[0].coloring.visible);

        renderer.cycle_scalars(&mut importer, CycleType::Field);
        renderer.cycle_scalars(&mut importer, CycleType::ArrayIndex);
        assert!(!renderer.use_cell_coloring(&mut importer));
        assert_eq!(renderer.array_index(&mut importer), 0);
    }

    #[test]
    fn array_cycle_passes_through_no_coloring() {
        let mut importer = height_triangle();
        let mut renderer = ColoringRenderer::new();
        renderer.update(&mut importer);
        let mut indices = Vec::new();
        for _ in 0..3 {
            renderer.cycle_scalars(&mut importer, CycleType::ArrayIndex);
            indices.push(renderer.array_index(&mut importer));
        }
        assert_eq!(indices, vec![0, 1, -1]);
        assert_eq!(renderer.coloring_description(&mut importer), "Not coloring\n");

        renderer.cycle_scalars(&mut importer, CycleType::ArrayIndex);
        renderer.cycle_scalars(&mut importer, CycleType::ArrayIndex);
        renderer.cycle_scalars(&mut importer, CycleType::Component);
        assert_eq!(
            renderer.coloring_description(&mut importer),
            "Coloring using point array named velocity, Component #0\n"
        );
    }

    #[test]
    fn direct_scalars_and_cell_coloring() {
        let mut importer = height_triangle();
        let mut renderer = ColoringRenderer::new();
        renderer.set_coloring(true, false, Some("velocity".into()), -2);
        renderer.show_scalar_bar(true);
        renderer.update(&mut importer);
        let mapper = &importer.entries()[0].coloring.mapper;
        assert_eq!(mapper.color_mode, ColorMode::DirectScalars);
        assert!(mapper.scalar_visibility);
        assert!(renderer.scalar_bar().is_none());

        renderer.set_coloring(true, true, Some("id".into()), -1);
        renderer.update(&mut importer);
        let mapper = &importer.entries()[0].coloring.mapper;
        assert!(mapper.use_cell_data);
        assert_eq!(mapper.color_mode, ColorMode::MapScalars);
        assert_eq!(mapper.range, [7.0, 7.0]);
    }

    #[test]
    fn user_range_and_bad_colormap() {
        let mut importer = height_triangle();
        let mut renderer = ColoringRenderer::new();
        renderer.set_coloring(true, false, Some("height".into()), 0);
        renderer.set_scalar_range(Some(vec![-1.0, 3.0]));
        renderer.set_colormap(vec![0.0, 1.0, 0.0]);
        renderer.update(&mut importer);
        assert_eq!(renderer.color_range(), [-1.0, 3.0]);
        assert_eq!(renderer.transfer_function().range(), [-1.0, 3.0]);

        renderer.set_scalar_range(Some(vec![1.0]));
        renderer.update(&mut importer);
        assert_eq!(renderer.color_range(), [0.0, 1.0]);
    }

    #[test]
    fn volume_selects_an_array_and_keeps_it() {
        let mut importer = density_volume();
        let mut renderer = ColoringRenderer::new();
        renderer.set_use_volume(true);
        renderer.update(&mut importer);
        assert_eq!(renderer.array_index(&mut importer), 0);
        let volume = &importer.volumes()[0];
        assert!(volume.visible);
        let mapper = volume.mapper.as_ref().unwrap_or_else(|| panic!("volume mapper"));
        assert_eq!(mapper.opacity.range, [0.0, 7.0]);
        assert!(!mapper.opacity.inverse);
        assert!(!importer.entries()[0].visible);

        renderer.set_use_inverse_opacity(true);
        renderer.update(&mut importer);
        let mapper = importer.volumes()[0].mapper.as_ref().unwrap_or_else(|| panic!("volume mapper"));
        assert!(mapper.opacity.inverse);

        renderer.set_use_volume(false);
        renderer.update(&mut importer);
        assert!(!importer.volumes()[0].visible);
        assert_eq!(renderer.array_index(&mut importer), 0);
    }

    #[test]
    fn point_sprites_mirror_the_geometry_mapper() {
        let mut importer = height_triangle();
        let mut renderer = ColoringRenderer::new();
        renderer.set_coloring(true, false, Some("height".into()), -1);
        renderer.set_use_point_sprites(true);
        renderer.update(&mut importer);
        let entry = &importer.entries()[0];
        assert!(entry.point_sprites.visible);
        assert!(entry.point_sprites.mapper.scalar_visibility);
        assert!(!entry.visible);
        assert!(!entry.coloring.visible);
    }

    #[test]
    fn cheat_sheet_reports_coloring_state() {
        let mut importer = height_triangle();
        let mut renderer = ColoringRenderer::new();
        let lines = renderer.cheat_sheet_lines(&mut importer);
        assert_eq!(lines[1], " S: Scalars coloring [OFF]");
        renderer.set_coloring(true, false, None, -1);
        renderer.update(&mut importer);
        let lines = renderer.cheat_sheet_lines(&mut importer);
        assert_eq!(lines[0], " C: Cell scalars coloring [OFF]");
        assert_eq!(lines[1], " S: Scalars coloring [height]");
        assert_eq!(lines[2], " Y: Coloring component [Magnitude]");
        assert_eq!(short_name("a_very_long_array_name_indeed", 19), "a_very_long_arra...");
    }
}
