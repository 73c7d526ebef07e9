use super::meta_importer::MetaImporter;
use crate::options::{AnimationOptions, Options};
use std::time::{Duration, Instant};

/// Tolerance under which an out of range time is clamped silently.
const TIME_EPSILON: f64 = 1e-6;

/// What the animation manager drives outside of the scene.
pub trait AnimationHost {
    /// `None` hides the animation progress bar.
    fn set_animation_progress(&mut self, progress: Option<f64>);

    /// Called after new geometry was loaded for a time value.
    fn on_time_changed(&mut self);

    fn request_render(&mut self);

    fn set_camera_movement_enabled(&mut self, enabled: bool);

    fn invalidate_cheat_sheet(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationState {
    Uninitialized,
    Stopped,
    Playing,
}

/// Wraps `time` into `[range[0], range[1])` with a floored modulo.
pub fn wrap_time(time: f64, range: [f64; 2]) -> f64 {
    let [lo, hi] = range;
    let span = hi - lo;
    if span <= 0.0 {
        return lo;
    }
    let offset = (time - lo).rem_euclid(span);
    // rem_euclid can round up to the span itself for tiny negative inputs.
    if offset >= span {
        lo
    } else {
        lo + offset
    }
}

pub struct AnimationManager {
    state: AnimationState,
    available: usize,
    /// Requested animation, -1 plays all of them.
    index: i32,
    prepared: Option<i32>,
    current_time: f64,
    current_time_set: bool,
    time_range: [f64; 2],
    frame_rate: f64,
    speed_factor: f64,
    camera_pinned: bool,
    show_progress: bool,
    last_tick: Option<Instant>,
}

impl Default for AnimationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationManager {
    pub fn new() -> Self {
        let defaults = AnimationOptions::default();
        Self {
            state: AnimationState::Uninitialized,
            available: 0,
            index: defaults.index,
            prepared: None,
            current_time: 0.0,
            current_time_set: false,
            time_range: [0.0, 0.0],
            frame_rate: defaults.frame_rate,
            speed_factor: defaults.speed_factor,
            camera_pinned: false,
            show_progress: false,
            last_tick: None,
        }
    }

    /// Takes the runtime-adjustable settings from `options`.
    pub fn apply_options(&mut self, options: &Options) {
        let animation = &options.scene.animation;
        self.speed_factor = animation.speed_factor;
        if animation.frame_rate > 0.0 {
            self.frame_rate = animation.frame_rate;
        }
        self.camera_pinned = options.scene.camera.index.is_some();
        self.show_progress = options.ui.animation_progress;
        self.index = animation.index;
    }

    /// Resets playback for a freshly loaded scene. Safe to call again after every load.
    pub fn initialize(
        &mut self,
        options: &Options,
        importer: &mut MetaImporter,
        host: &mut dyn AnimationHost,
    ) {
        self.apply_options(options);
        self.state = AnimationState::Stopped;
        self.current_time = 0.0;
        self.current_time_set = false;
        self.last_tick = None;
        self.available = importer.number_of_animations();

        host.set_animation_progress((self.available > 0 && self.show_progress).then_some(0.0));

        self.prepared = None;
        self.prepare(importer);

        if self.available == 0 {
            log::debug!("No animation available");
            return;
        }
        log::debug!("Animation(s) available are:");
        for index in 0..self.available {
            log::debug!("{}: {}", index, importer.animation_name(index));
        }

        if options.scene.animation.autoplay {
            self.start(importer, host);
        }
        if let Some(time) = options.scene.animation.time {
            self.load_at_time(time, importer, host);
        }
    }

    /// Enables the requested animations on the importer and recomputes the time range.
    fn prepare(&mut self, importer: &mut MetaImporter) {
        let mut index = self.index;
        if self.available > 0 && index >= self.available as i32 {
            log::warn!(
                "Specified animation index: {} is not in range [0, {}], ignoring",
                index,
                self.available - 1
            );
            index = 0;
            self.index = 0;
        }
        if self.prepared == Some(index) {
            return;
        }
        self.prepared = Some(index);
        if self.available == 0 {
            return;
        }

        for animation in 0..self.available {
            importer.disable_animation(animation);
        }
        if index < 0 {
            for animation in 0..self.available {
                importer.enable_animation(animation);
            }
        } else {
            importer.enable_animation(index as usize);
        }

        let mut range = [f64::INFINITY, f64::NEG_INFINITY];
        let mut found = false;
        for animation in 0..self.available {
            if !importer.is_animation_enabled(animation) {
                continue;
            }
            if let Some(info) = importer.temporal_information(animation, self.frame_rate) {
                range[0] = range[0].min(info.time_range[0]);
                range[1] = range[1].max(info.time_range[1]);
                found = true;
            }
        }
        if !found {
            self.time_range = [0.0, 0.0];
            return;
        }
        if range[0] > range[1] {
            log::warn!(
                "Animation(s) time range delta is invalid: [{}, {}]. Swapping range.",
                range[0],
                range[1]
            );
            range.swap(0, 1);
        }
        log::debug!("Current animation time range is: [{}, {}].", range[0], range[1]);
        self.time_range = range;
    }

    pub fn start(&mut self, importer: &mut MetaImporter, host: &mut dyn AnimationHost) {
        if !self.is_playing() {
            self.toggle(importer, host);
        }
    }

    pub fn stop(&mut self, importer: &mut MetaImporter, host: &mut dyn AnimationHost) {
        if self.is_playing() {
            self.toggle(importer, host);
        }
    }

    /// Flips between playing and stopped.
    pub fn toggle(&mut self, importer: &mut MetaImporter, host: &mut dyn AnimationHost) {
        if self.state == AnimationState::Uninitialized || self.available == 0 {
            return;
        }
        self.prepare(importer);
        self.state = match self.state {
            AnimationState::Playing => AnimationState::Stopped,
            _ => AnimationState::Playing,
        };
        self.last_tick = None;
        if self.is_playing() && !self.current_time_set {
            self.current_time = self.time_range[0];
            self.current_time_set = true;
        }
        host.set_camera_movement_enabled(!(self.is_playing() && self.camera_pinned));
    }

    /// Advances the current time by the wall-clock time elapsed since the previous tick.
    pub fn tick(&mut self, now: Instant, importer: &mut MetaImporter, host: &mut dyn AnimationHost) {
        if !self.is_playing() {
            return;
        }
        let elapsed = self
            .last_tick
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        self.last_tick = Some(now);
        self.advance(elapsed, importer, host);
    }

    fn advance(&mut self, elapsed: f64, importer: &mut MetaImporter, host: &mut dyn AnimationHost) {
        self.current_time += elapsed * self.speed_factor;
        let [lo, hi] = self.time_range;
        if self.current_time < lo || self.current_time >= hi {
            self.current_time = wrap_time(self.current_time, self.time_range);
        }
        if self.load_at_time(self.current_time, importer, host) {
            host.request_render();
        }
    }

    /// When the next tick is due, `None` when not playing.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        if !self.is_playing() {
            return None;
        }
        Some(self.last_tick.map(|last| last + self.period()).unwrap_or(now))
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate)
    }

    /// Loads the scene at `time`, clamped into the time range.
    /// Returns whether new geometry was loaded.
    pub fn load_at_time(
        &mut self,
        time: f64,
        importer: &mut MetaImporter,
        host: &mut dyn AnimationHost,
    ) -> bool {
        if self.available == 0 {
            log::warn!("No animation available, cannot load a specific animation time");
            if self.is_playing() {
                self.state = AnimationState::Stopped;
            }
            return false;
        }
        self.prepare(importer);

        let [lo, hi] = self.time_range;
        let mut time = time;
        if time < lo {
            if lo - time > TIME_EPSILON {
                log::warn!(
                    "Animation time {} is outside of range [{}, {}], using {}.",
                    time,
                    lo,
                    hi,
                    lo
                );
            }
            time = lo;
        } else if time > hi {
            if time - hi > TIME_EPSILON {
                log::warn!(
                    "Animation time {} is outside of range [{}, {}], using {}.",
                    time,
                    lo,
                    hi,
                    hi
                );
            }
            time = hi;
        }
        self.current_time = time;
        self.current_time_set = true;

        if let Err(err) = importer.update_at_time_value(time) {
            log::error!("Could not load time value: {} ({})", time, err);
            return false;
        }

        if self.show_progress {
            let span = hi - lo;
            let progress = if span > 0.0 { (time - lo) / span } else { 0.0 };
            host.set_animation_progress(Some(progress));
        }
        host.on_time_changed();
        true
    }

    /// Selects the next animation: `0, 1, .., N-1`, then all of them, then `0` again.
    pub fn cycle_animation(&mut self, importer: &mut MetaImporter, host: &mut dyn AnimationHost) {
        if self.available == 0 {
            return;
        }
        self.index = if self.index < 0 {
            0
        } else if self.index as usize + 1 >= self.available {
            -1
        } else {
            self.index + 1
        };
        self.prepare(importer);
        self.load_at_time(self.time_range[0], importer, host);
        host.invalidate_cheat_sheet();
    }

    pub fn animation_name(&self, importer: &MetaImporter) -> String {
        match self.prepared {
            _ if self.available == 0 => "No animation".to_string(),
            Some(index) if index < 0 => "All animations".to_string(),
            Some(index) => importer.animation_name(index as usize),
            None => "No animation".to_string(),
        }
    }

    /// Requested animation index, -1 for all.
    pub fn animation_index(&self) -> i32 {
        self.index
    }

    pub fn state(&self) -> AnimationState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == AnimationState::Playing
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn time_range(&self) -> [f64; 2] {
        self.time_range
    }

    pub fn available_animations(&self) -> usize {
        self.available
    }
}

#[cfg(test)]
mod tests {
    use super::{wrap_time, AnimationHost, AnimationManager, AnimationState};
    use crate::dataset::PolyData;
    use crate::importer::{Actor, AnimationSupport, Importer, Result, TemporalInfo, UpdateStatus};
    use crate::options::Options;
    use crate::scene::meta_importer::MetaImporter;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Host {
        progress: Option<f64>,
        renders: usize,
        camera_movement: Option<bool>,
        cheat_sheet_invalidated: usize,
    }

    impl AnimationHost for Host {
        fn set_animation_progress(&mut self, progress: Option<f64>) {
            self.progress = progress;
        }

        fn on_time_changed(&mut self) {}

        fn request_render(&mut self) {
            self.renders += 1;
        }

        fn set_camera_movement_enabled(&mut self, enabled: bool) {
            self.camera_movement = Some(enabled);
        }

        fn invalidate_cheat_sheet(&mut self) {
            self.cheat_sheet_invalidated += 1;
        }
    }

    /// Two animations over `[0, 2]` and `[1, 4]`.
    struct Animated {
        actors: Vec<Actor>,
        enabled: [bool; 2],
        loaded: Rc<RefCell<Vec<f64>>>,
    }

    impl Importer for Animated {
        fn update(&mut self, _progress: &mut dyn FnMut(f64)) -> Result<()> {
            Ok(())
        }

        fn update_status(&self) -> UpdateStatus {
            UpdateStatus::Success
        }

        fn actors(&self) -> &[Actor] {
            &self.actors
        }

        fn actors_mut(&mut self) -> &mut [Actor] {
            &mut self.actors
        }

        fn outputs_description(&self) -> String {
            String::new()
        }

        fn number_of_animations(&self) -> i32 {
            2
        }

        fn animation_name(&self, index: usize) -> Option<String> {
            ["walk", "run"].get(index).map(|name| name.to_string())
        }

        fn enable_animation(&mut self, index: usize) {
            self.enabled[index] = true;
        }

        fn disable_animation(&mut self, index: usize) {
            self.enabled[index] = false;
        }

        fn is_animation_enabled(&self, index: usize) -> bool {
            self.enabled[index]
        }

        fn animation_support(&self) -> AnimationSupport {
            AnimationSupport::Multi
        }

        fn temporal_information(&self, index: usize, _frame_rate: f64) -> Option<TemporalInfo> {
            let time_range = [[0.0, 2.0], [1.0, 4.0]][index];
            Some(TemporalInfo {
                number_of_time_steps: 2,
                time_range,
                time_steps: time_range.to_vec(),
            })
        }

        fn update_at_time_value(&mut self, time: f64) -> Result<()> {
            self.loaded.borrow_mut().push(time);
            Ok(())
        }
    }

    fn scene() -> (MetaImporter, Rc<RefCell<Vec<f64>>>) {
        let loaded = Rc::new(RefCell::new(Vec::new()));
        let mut meta = MetaImporter::new();
        meta.add_importer(Box::new(Animated {
            actors: vec![Actor::new("a", Arc::new(PolyData::default()))],
            enabled: [false; 2],
            loaded: Rc::clone(&loaded),
        }));
        meta.update(&mut |_| {}).unwrap();
        (meta, loaded)
    }

    #[test]
    fn wrapped_time_stays_in_range() {
        let range = [1.0, 3.0];
        for &time in &[-7.5, -1.0, 0.999, 1.0, 2.5, 3.0, 3.25, 10.0, 1e6 + 0.5] {
            let wrapped = wrap_time(time, range);
            assert!((1.0..3.0).contains(&wrapped), "{} wrapped to {}", time, wrapped);
        }
        assert_eq!(wrap_time(3.25, range), 1.25);
        assert_eq!(wrap_time(7.5, range), 1.5);
        assert_eq!(wrap_time(-0.5, range), 1.5);
        assert_eq!(wrap_time(42.0, [2.0, 2.0]), 2.0);
    }

    #[test]
    fn tick_wraps_for_any_speed() {
        for &speed in &[1.0, -1.0, 3.5, -10.0] {
            let (mut meta, _) = scene();
            let mut host = Host::default();
            let mut options = Options::default();
            options.scene.animation.speed_factor = speed;
            let mut manager = AnimationManager::new();
            manager.initialize(&options, &mut meta, &mut host);
            manager.toggle(&mut meta, &mut host);

            let start = Instant::now();
            manager.tick(start, &mut meta, &mut host);
            for step in 1..20 {
                let now = start + Duration::from_millis(370 * step);
                manager.tick(now, &mut meta, &mut host);
                let time = manager.current_time();
                assert!((0.0..2.0).contains(&time), "speed {} gave {}", speed, time);
            }
            assert_eq!(host.renders, 20);
        }
    }

    #[test]
    fn initialize_enables_requested_animation() {
        let (mut meta, _) = scene();
        let mut host = Host::default();
        let mut options = Options::default();
        options.ui.animation_progress = true;
        let mut manager = AnimationManager::new();
        manager.initialize(&options, &mut meta, &mut host);

        assert_eq!(manager.state(), AnimationState::Stopped);
        assert_eq!(manager.available_animations(), 2);
        assert!(meta.is_animation_enabled(0));
        assert!(!meta.is_animation_enabled(1));
        assert_eq!(manager.time_range(), [0.0, 2.0]);
        assert_eq!(manager.animation_name(&meta), "walk");
        assert_eq!(host.progress, Some(0.0));
    }

    #[test]
    fn invalid_index_falls_back_to_first() {
        let (mut meta, _) = scene();
        let mut host = Host::default();
        let mut options = Options::default();
        options.scene.animation.index = 7;
        let mut manager = AnimationManager::new();
        manager.initialize(&options, &mut meta, &mut host);
        assert_eq!(manager.animation_index(), 0);
        assert!(meta.is_animation_enabled(0));
    }

    #[test]
    fn cycling_walks_through_all_animations() {
        let (mut meta, loaded) = scene();
        let mut host = Host::default();
        let mut manager = AnimationManager::new();
        manager.initialize(&Options::default(), &mut meta, &mut host);

        manager.cycle_animation(&mut meta, &mut host);
        assert_eq!(manager.animation_name(&meta), "run");
        assert_eq!(manager.time_range(), [1.0, 4.0]);

        manager.cycle_animation(&mut meta, &mut host);
        assert_eq!(manager.animation_index(), -1);
        assert_eq!(manager.animation_name(&meta), "All animations");
        assert_eq!(manager.time_range(), [0.0, 4.0]);
        assert!(meta.is_animation_enabled(0) && meta.is_animation_enabled(1));

        manager.cycle_animation(&mut meta, &mut host);
        assert_eq!(manager.animation_index(), 0);
        assert_eq!(host.cheat_sheet_invalidated, 3);
        assert_eq!(*loaded.borrow(), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn load_at_time_clamps_and_reports_progress() {
        let (mut meta, loaded) = scene();
        let mut host = Host::default();
        let mut options = Options::default();
        options.ui.animation_progress = true;
        options.scene.animation.time = Some(1.5);
        let mut manager = AnimationManager::new();
        manager.initialize(&options, &mut meta, &mut host);
        assert_eq!(host.progress, Some(0.75));

        assert!(manager.load_at_time(5.0, &mut meta, &mut host));
        assert_eq!(manager.current_time(), 2.0);
        assert_eq!(*loaded.borrow(), vec![1.5, 2.0]);
    }

    #[test]
    fn pinned_camera_disables_movement_while_playing() {
        let (mut meta, _) = scene();
        let mut host = Host::default();
        let mut options = Options::default();
        options.scene.camera.index = Some(0);
        options.scene.animation.autoplay = true;
        let mut manager = AnimationManager::new();
        manager.initialize(&options, &mut meta, &mut host);
        assert!(manager.is_playing());
        assert_eq!(host.camera_movement, Some(false));

        manager.toggle(&mut meta, &mut host);
        assert_eq!(host.camera_movement, Some(true));
        assert!(manager.next_deadline(Instant::now()).is_none());
    }
}
