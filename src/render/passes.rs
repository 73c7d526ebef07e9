//! Offscreen pass graph and the final blend program.
//!
//! Props are split into three buckets each rendered into its own layer:
//! background (skybox), main (everything else) and main-on-top (armatures).
//! The layers are then composited by a [`BlendProgram`] whose source text is
//! generated from the configuration. Configuration setters bump a
//! modification time; the graph is rebuilt only when that time is newer than
//! the last initialization.

use std::fmt;

use glam::{Mat4, Vec4};

use super::raster::{over, premultiplied_convert, Layer};
use super::post;
use crate::dataset::BoundingBox;
use crate::importer::{linear_to_srgb, srgb_to_linear};

/// Identifier of a prop owned by the renderer.
pub type PropId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    Skybox,
    Scene,
    Armature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prop {
    pub id: PropId,
    pub kind: PropKind,
}

/// Work a leaf pass asks the scene to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lights,
    Opaque,
    Translucent { depth_peeling: bool },
    Volumetric,
}

/// Draws props into a layer. Implemented by the renderer.
pub trait PropPainter {
    fn paint(&mut self, stage: Stage, props: &[PropId], target: &mut Layer);
}

/// Per-frame information shared by every pass.
#[derive(Debug, Clone, Copy)]
pub struct PassContext {
    pub width: u32,
    pub height: u32,
    pub projection: Mat4,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pass {
    Camera(Box<Pass>),
    Sequence(Vec<Pass>),
    Lights,
    Opaque,
    Translucent,
    Volumetric,
    /// Translucent and volumetric geometry resolved together.
    DualDepthPeeling,
    Ssao {
        radius: f32,
        bias: f32,
        kernel_size: u32,
        delegate: Box<Pass>,
    },
    HexagonalBokehBlur {
        circle_of_confusion: f32,
        delegate: Box<Pass>,
    },
}

impl Pass {
    fn camera(delegate: Pass) -> Pass {
        Pass::Camera(Box::new(delegate))
    }

    fn execute(
        &self,
        context: &PassContext,
        props: &[PropId],
        painter: &mut dyn PropPainter,
        target: &mut Layer,
    ) {
        match self {
            Pass::Camera(delegate) => delegate.execute(context, props, painter, target),
            Pass::Sequence(passes) => {
                for pass in passes {
                    pass.execute(context, props, painter, target);
                }
            }
            Pass::Lights => painter.paint(Stage::Lights, props, target),
            Pass::Opaque => painter.paint(Stage::Opaque, props, target),
            Pass::Translucent => painter.paint(
                Stage::Translucent {
                    depth_peeling: false,
                },
                props,
                target,
            ),
            Pass::Volumetric => painter.paint(Stage::Volumetric, props, target),
            Pass::DualDepthPeeling => {
                painter.paint(Stage::Translucent { depth_peeling: true }, props, target);
                painter.paint(Stage::Volumetric, props, target);
            }
            Pass::Ssao {
                radius,
                bias,
                kernel_size,
                delegate,
            } => {
                delegate.execute(context, props, painter, target);
                post::ambient_occlusion(target, context.projection, *radius, *bias, *kernel_size);
            }
            Pass::HexagonalBokehBlur {
                circle_of_confusion,
                delegate,
            } => {
                delegate.execute(context, props, painter, target);
                post::hexagonal_bokeh_blur(target, *circle_of_confusion);
            }
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pass::Camera(delegate) => write!(f, "camera({delegate})"),
            Pass::Sequence(passes) => {
                write!(f, "sequence(")?;
                for (i, pass) in passes.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{pass}")?;
                }
                write!(f, ")")
            }
            Pass::Lights => write!(f, "lights"),
            Pass::Opaque => write!(f, "opaque"),
            Pass::Translucent => write!(f, "translucent"),
            Pass::Volumetric => write!(f, "volumetric"),
            Pass::DualDepthPeeling => write!(f, "dual-depth-peeling(translucent, volumetric)"),
            Pass::Ssao { delegate, .. } => write!(f, "ssao({delegate})"),
            Pass::HexagonalBokehBlur { delegate, .. } => write!(f, "bokeh-blur({delegate})"),
        }
    }
}

/// A pass rendering into its own cleared, sRGB encoded layer.
#[derive(Debug, Clone)]
pub struct FramebufferPass {
    delegate: Pass,
    layer: Layer,
}

impl FramebufferPass {
    pub fn new(delegate: Pass) -> Self {
        Self {
            delegate,
            layer: Layer::new(0, 0),
        }
    }

    pub fn delegate(&self) -> &Pass {
        &self.delegate
    }

    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    fn render(&mut self, context: &PassContext, props: &[PropId], painter: &mut dyn PropPainter) {
        self.layer.resize(context.width, context.height);
        self.layer.clear(Vec4::ZERO);
        self.delegate.execute(context, props, painter, &mut self.layer);
        self.layer.encode_srgb();
    }
}

/// Flags that change the blend program source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendOptions {
    pub force_opaque_background: bool,
    pub has_on_top: bool,
}

#[derive(Debug, Clone)]
pub struct BlendProgram {
    options: BlendOptions,
    source: String,
}

impl BlendProgram {
    pub fn new(options: BlendOptions) -> Self {
        Self {
            options,
            source: blend_source(options),
        }
    }

    pub fn options(&self) -> BlendOptions {
        self.options
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Composites the layers back to front. Inputs and output are sRGB
    /// encoded with premultiplied alpha.
    pub fn execute(&self, background: &Layer, main: &Layer, on_top: Option<&Layer>) -> Layer {
        let mut result = Layer::new(main.width(), main.height());
        let on_top = on_top.filter(|_| self.options.has_on_top);
        for i in 0..result.color.len() {
            let background_color = background
                .color
                .get(i)
                .map_or(Vec4::ZERO, |c| premultiplied_convert(*c, srgb_to_linear));
            let main_color = premultiplied_convert(main.color[i], srgb_to_linear);
            let mut color = over(main_color, background_color);
            let mut depth = main.depth[i];
            if let Some(layer) = on_top {
                let top = layer
                    .color
                    .get(i)
                    .map_or(Vec4::ZERO, |c| premultiplied_convert(*c, srgb_to_linear));
                color = over(top, color);
                if top.w > 0.0 {
                    depth = depth.min(layer.depth[i]);
                }
            }
            if self.options.force_opaque_background {
                color.w = 1.0;
            }
            result.color[i] = premultiplied_convert(color, linear_to_srgb);
            result.depth[i] = depth;
        }
        result
    }
}

fn blend_source(options: BlendOptions) -> String {
    let mut source = String::from(
        "uniform sampler2D texBackground;\n\
         uniform sampler2D texMain;\n",
    );
    if options.has_on_top {
        source.push_str("uniform sampler2D texMainOnTop;\n");
    }
    source.push_str(
        "in vec2 texCoord;\n\
         vec3 toLinear(vec3 c) { return mix(c / 12.92, pow((c + 0.055) / 1.055, vec3(2.4)), step(0.04045, c)); }\n\
         vec3 toSrgb(vec3 c) { return mix(c * 12.92, 1.055 * pow(c, vec3(1.0 / 2.4)) - 0.055, step(0.0031308, c)); }\n\
         vec4 unpremultipliedToLinear(vec4 c) { if (c.a <= 0.0) return vec4(0.0); return vec4(toLinear(c.rgb / c.a) * c.a, c.a); }\n\
         void main()\n{\n\
         \x20 vec4 background = unpremultipliedToLinear(texture(texBackground, texCoord));\n\
         \x20 vec4 mainColor = unpremultipliedToLinear(texture(texMain, texCoord));\n\
         \x20 vec4 result = mainColor + background * (1.0 - mainColor.a);\n",
    );
    if options.has_on_top {
        source.push_str(
            "  vec4 onTop = unpremultipliedToLinear(texture(texMainOnTop, texCoord));\n\
             \x20 result = onTop + result * (1.0 - onTop.a);\n",
        );
    }
    if options.force_opaque_background {
        source.push_str("  result.a = 1.0;\n");
    }
    source.push_str(
        "  gl_FragData[0] = result.a > 0.0 ? vec4(toSrgb(result.rgb / result.a) * result.a, result.a) : vec4(0.0);\n}\n",
    );
    source
}

/// Three layer pass pipeline with timestamp gated reconstruction.
#[derive(Debug, Clone)]
pub struct RenderPass {
    use_ssao: bool,
    use_depth_peeling: bool,
    use_blur_background: bool,
    circle_of_confusion: f32,
    force_opaque_background: bool,
    armature_visible: bool,
    bounds: BoundingBox,
    props: Vec<Prop>,

    configuration_mtime: u64,
    initialize_time: u64,
    shader_change_value: u64,

    background: Option<FramebufferPass>,
    main: Option<FramebufferPass>,
    on_top: Option<FramebufferPass>,
    background_props: Vec<PropId>,
    main_props: Vec<PropId>,
    on_top_props: Vec<PropId>,
    blend: Option<BlendProgram>,
    composed: Option<Layer>,

    initialize_count: usize,
    shader_build_count: usize,
    scene_render_count: usize,
}

impl Default for RenderPass {
    fn default() -> Self {
        Self {
            use_ssao: false,
            use_depth_peeling: false,
            use_blur_background: false,
            circle_of_confusion: 20.0,
            force_opaque_background: false,
            armature_visible: false,
            bounds: BoundingBox::empty(),
            props: Vec::new(),
            configuration_mtime: 1,
            initialize_time: 0,
            shader_change_value: 0,
            background: None,
            main: None,
            on_top: None,
            background_props: Vec::new(),
            main_props: Vec::new(),
            on_top_props: Vec::new(),
            blend: None,
            composed: None,
            initialize_count: 0,
            shader_build_count: 0,
            scene_render_count: 0,
        }
    }
}

macro_rules! config_setter {
    ($name:ident, $field:ident, $ty:ty) => {
        pub fn $name(&mut self, value: $ty) {
            if self.$field != value {
                self.$field = value;
                self.modified();
            }
        }
    };
}

impl RenderPass {
    pub fn new() -> Self {
        Self::default()
    }

    fn modified(&mut self) {
        self.configuration_mtime += 1;
    }

    config_setter!(set_use_ssao, use_ssao, bool);
    config_setter!(set_use_depth_peeling, use_depth_peeling, bool);
    config_setter!(set_use_blur_background, use_blur_background, bool);
    config_setter!(set_circle_of_confusion, circle_of_confusion, f32);
    config_setter!(set_force_opaque_background, force_opaque_background, bool);
    config_setter!(set_armature_visible, armature_visible, bool);
    config_setter!(set_props, props, Vec<Prop>);

    /// Only changes in bounds validity or extent affect SSAO parameters.
    pub fn set_bounds(&mut self, bounds: BoundingBox) {
        if self.bounds != bounds {
            self.bounds = bounds;
            if self.use_ssao {
                self.modified();
            }
        }
    }

    pub fn configuration_mtime(&self) -> u64 {
        self.configuration_mtime
    }

    pub fn initialize_time(&self) -> u64 {
        self.initialize_time
    }

    pub fn initialize_count(&self) -> usize {
        self.initialize_count
    }

    pub fn shader_build_count(&self) -> usize {
        self.shader_build_count
    }

    pub fn scene_render_count(&self) -> usize {
        self.scene_render_count
    }

    pub fn blend_program(&self) -> Option<&BlendProgram> {
        self.blend.as_ref()
    }

    pub fn main_pass(&self) -> Option<&Pass> {
        self.main.as_ref().map(FramebufferPass::delegate)
    }

    pub fn background_pass(&self) -> Option<&Pass> {
        self.background.as_ref().map(FramebufferPass::delegate)
    }

    pub fn on_top_props(&self) -> &[PropId] {
        &self.on_top_props
    }

    pub fn main_props(&self) -> &[PropId] {
        &self.main_props
    }

    pub fn background_props(&self) -> &[PropId] {
        &self.background_props
    }

    fn initialize(&mut self) {
        self.background = None;
        self.main = None;
        self.on_top = None;
        self.composed = None;

        self.background_props.clear();
        self.main_props.clear();
        self.on_top_props.clear();
        for prop in &self.props {
            match prop.kind {
                PropKind::Skybox => self.background_props.push(prop.id),
                PropKind::Armature if self.armature_visible => self.on_top_props.push(prop.id),
                PropKind::Armature => {}
                PropKind::Scene => self.main_props.push(prop.id),
            }
        }

        let background = Pass::camera(Pass::Opaque);
        let background = if self.use_blur_background {
            Pass::HexagonalBokehBlur {
                circle_of_confusion: self.circle_of_confusion,
                delegate: Box::new(background),
            }
        } else {
            background
        };
        self.background = Some(FramebufferPass::new(background));

        let opaque = if self.use_ssao && self.bounds.is_valid() {
            let diagonal = self.bounds.diagonal();
            Pass::Ssao {
                radius: 0.1 * diagonal,
                bias: 0.001 * diagonal,
                kernel_size: 32,
                delegate: Box::new(Pass::camera(Pass::Opaque)),
            }
        } else {
            Pass::Opaque
        };
        let mut sequence = vec![Pass::Lights, opaque];
        if self.use_depth_peeling {
            sequence.push(Pass::DualDepthPeeling);
        } else {
            sequence.push(Pass::Translucent);
            sequence.push(Pass::Volumetric);
        }
        self.main = Some(FramebufferPass::new(Pass::camera(Pass::Sequence(sequence))));

        if !self.on_top_props.is_empty() {
            self.on_top = Some(FramebufferPass::new(Pass::camera(Pass::Sequence(vec![
                Pass::Lights,
                Pass::Opaque,
            ]))));
        }

        self.initialize_time = self.configuration_mtime;
        self.initialize_count += 1;
        log::debug!(
            "render passes initialized: main {}",
            self.main_pass().map(ToString::to_string).unwrap_or_default()
        );
    }

    fn ensure_blend_program(&mut self) {
        let options = BlendOptions {
            force_opaque_background: self.force_opaque_background,
            has_on_top: self.on_top.is_some(),
        };
        let stale = self.shader_change_value < self.configuration_mtime
            && self.blend.as_ref().map(BlendProgram::options) != Some(options);
        if self.blend.is_none() || stale {
            self.blend = Some(BlendProgram::new(options));
            self.shader_build_count += 1;
        }
        self.shader_change_value = self.configuration_mtime;
    }

    /// Renders all layers and returns the composited result. With `ui_only`
    /// the layers of the previous frame are reused.
    pub fn render(
        &mut self,
        context: &PassContext,
        painter: &mut dyn PropPainter,
        ui_only: bool,
    ) -> Layer {
        if self.initialize_time < self.configuration_mtime {
            self.initialize();
        }
        self.ensure_blend_program();

        let size_changed = self
            .main
            .as_ref()
            .map_or(true, |pass| pass.layer().size() != [context.width, context.height]);
        if ui_only && !size_changed {
            if let Some(composed) = &self.composed {
                return composed.clone();
            }
        }

        if let Some(pass) = &mut self.background {
            pass.render(context, &self.background_props, painter);
        }
        if let Some(pass) = &mut self.main {
            pass.render(context, &self.main_props, painter);
        }
        if let Some(pass) = &mut self.on_top {
            pass.render(context, &self.on_top_props, painter);
        }
        self.scene_render_count += 1;

        let empty = Layer::new(context.width, context.height);
        let background = self.background.as_ref().map_or(&empty, FramebufferPass::layer);
        let main = self.main.as_ref().map_or(&empty, FramebufferPass::layer);
        let on_top = self.on_top.as_ref().map(FramebufferPass::layer);
        let composed = match &self.blend {
            Some(program) => program.execute(background, main, on_top),
            None => main.clone(),
        };
        self.composed = Some(composed.clone());
        composed
    }
}

#[cfg(test)]
mod tests {
    use super::{Pass, PassContext, Prop, PropId, PropKind, PropPainter, RenderPass, Stage};
    use crate::dataset::BoundingBox;
    use crate::render::raster::Layer;
    use glam::{Mat4, Vec3, Vec4};

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(Stage, Vec<PropId>)>,
    }

    impl PropPainter for Recorder {
        fn paint(&mut self, stage: Stage, props: &[PropId], target: &mut Layer) {
            self.calls.push((stage, props.to_vec()));
            if stage == Stage::Opaque {
                for (i, color) in target.color.iter_mut().enumerate() {
                    if props.contains(&1) && i == 0 {
                        *color = Vec4::new(1.0, 0.0, 0.0, 1.0);
                        target.depth[i] = 0.5;
                    }
                }
            }
        }
    }

    fn context() -> PassContext {
        PassContext {
            width: 2,
            height: 2,
            projection: Mat4::perspective_rh(0.5, 1.0, 0.1, 10.0),
        }
    }

    fn props() -> Vec<Prop> {
        vec![
            Prop { id: 0, kind: PropKind::Skybox },
            Prop { id: 1, kind: PropKind::Scene },
            Prop { id: 2, kind: PropKind::Armature },
        ]
    }

    #[test]
    fn props_are_partitioned_by_kind() {
        let mut pass = RenderPass::new();
        pass.set_props(props());
        let mut recorder = Recorder::default();
        pass.render(&context(), &mut recorder, false);
        assert_eq!(pass.background_props(), &[0]);
        assert_eq!(pass.main_props(), &[1]);
        assert!(pass.on_top_props().is_empty());

        pass.set_armature_visible(true);
        pass.render(&context(), &mut recorder, false);
        assert_eq!(pass.on_top_props(), &[2]);
        assert!(pass.blend_program().is_some_and(|p| p.source().contains("texMainOnTop")));
    }

    #[test]
    fn unrelated_render_does_not_reinitialize() {
        let mut pass = RenderPass::new();
        pass.set_props(props());
        let mut recorder = Recorder::default();
        pass.render(&context(), &mut recorder, false);
        assert_eq!(pass.initialize_count(), 1);
        assert_eq!(pass.shader_build_count(), 1);

        pass.set_use_ssao(false);
        pass.set_props(props());
        pass.render(&context(), &mut recorder, false);
        assert_eq!(pass.initialize_count(), 1);
        assert_eq!(pass.initialize_time(), pass.configuration_mtime());

        pass.set_use_depth_peeling(true);
        pass.render(&context(), &mut recorder, false);
        assert_eq!(pass.initialize_count(), 2);
        assert_eq!(pass.shader_build_count(), 1);
        assert!(pass
            .main_pass()
            .is_some_and(|p| p.to_string().contains("dual-depth-peeling")));

        pass.set_force_opaque_background(true);
        pass.render(&context(), &mut recorder, false);
        assert_eq!(pass.shader_build_count(), 2);
        assert!(pass.blend_program().is_some_and(|p| p.source().contains("result.a = 1.0")));
    }

    #[test]
    fn ssao_and_blur_wrap_their_delegates() {
        let mut pass = RenderPass::new();
        pass.set_use_ssao(true);
        pass.set_use_blur_background(true);
        pass.set_bounds(BoundingBox::from_points(&[Vec3::ZERO, Vec3::ONE]));
        pass.render(&context(), &mut Recorder::default(), false);
        let main = pass.main_pass().map(ToString::to_string).unwrap_or_default();
        assert_eq!(main, "camera(sequence(lights, ssao(camera(opaque)), translucent, volumetric))");
        assert!(matches!(pass.background_pass(), Some(Pass::HexagonalBokehBlur { .. })));

        let mut without_bounds = RenderPass::new();
        without_bounds.set_use_ssao(true);
        without_bounds.render(&context(), &mut Recorder::default(), false);
        assert!(without_bounds
            .main_pass()
            .is_some_and(|p| !p.to_string().contains("ssao")));
    }

    #[test]
    fn ui_only_reuses_previous_layers() {
        let mut pass = RenderPass::new();
        pass.set_props(props());
        let mut recorder = Recorder::default();
        let first = pass.render(&context(), &mut recorder, false);
        let calls = recorder.calls.len();
        let second = pass.render(&context(), &mut recorder, true);
        assert_eq!(recorder.calls.len(), calls);
        assert_eq!(first, second);
        assert_eq!(pass.scene_render_count(), 1);
    }

    #[test]
    fn blend_composites_main_over_background() {
        let mut pass = RenderPass::new();
        pass.set_props(props());
        pass.set_force_opaque_background(true);
        let composed = pass.render(&context(), &mut Recorder::default(), false);
        let red = composed.pixel(0, 0);
        assert!((red.x - 1.0).abs() < 1e-4 && red.y.abs() < 1e-4);
        assert_eq!(composed.pixel(1, 1).w, 1.0);
        assert_eq!(composed.depth_at(0, 0), 0.5);
    }
}
