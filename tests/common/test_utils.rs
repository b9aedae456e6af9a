use anyhow::Error;
use view_ngin::{
    context::Context,
    data_structures::scene_graph::SceneNode,
    flow::{GraphicsFlow, ImageTestResult, Out},
    render::Render,
};

pub(crate) type Frame = image::ImageBuffer<image::Rgba<u8>, wgpu::BufferView>;

pub(crate) struct State {
    frame_counter: u32,
    init_invocations: u32,
    update_invocations: u32,
    event_invocations: u32,
    pub dummy_state: String,
}

impl State {
    pub fn new() -> Self {
        Self {
            frame_counter: 0,
            init_invocations: 0,
            update_invocations: 0,
            event_invocations: 0,
            dummy_state: String::new(),
        }
    }

    pub fn frame(&mut self) {
        self.frame_counter += 1;
    }

    pub fn init(&mut self) {
        self.init_invocations += 1;
    }

    pub fn update(&mut self) {
        self.update_invocations += 1;
    }

    pub fn event(&mut self) {
        self.event_invocations += 1;
    }

    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    pub fn init_invocations(&self) -> u32 {
        self.init_invocations
    }

    pub fn update_invocations(&self) -> u32 {
        self.update_invocations
    }

    pub fn event_invocations(&self) -> u32 {
        self.event_invocations
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub(crate) struct FrameCounter(pub(crate) u32);

impl FrameCounter {
    pub(crate) fn frame(&self) -> u32 {
        self.0
    }

    pub(crate) fn progress(&mut self) {
        self.0 += 1;
    }
}

type Setup = Box<dyn Fn(&mut Context)>;
type Validate = Box<dyn Fn(&Context, &mut FrameCounter, &mut Frame) -> Result<ImageTestResult, Error>>;

/// Renders an optional scene node and hands every frame to `validate`.
pub(crate) struct TestRender {
    scene: Option<Box<dyn SceneNode>>,
    setup: Setup,
    validate: Validate,
}

impl TestRender {
    pub(crate) fn new(
        scene: Option<Box<dyn SceneNode>>,
        setup: impl Fn(&mut Context) + 'static,
        validate: impl Fn(&Context, &mut FrameCounter, &mut Frame) -> Result<ImageTestResult, Error>
        + 'static,
    ) -> Self {
        Self {
            scene,
            setup: Box::new(setup),
            validate: Box::new(validate),
        }
    }
}

impl GraphicsFlow<FrameCounter, ()> for TestRender {
    fn on_init(&mut self, ctx: &mut Context, _: &mut FrameCounter) -> Out<FrameCounter, ()> {
        (self.setup)(ctx);
        Out::Empty
    }

    fn on_update(
        &mut self,
        ctx: &Context,
        state: &mut FrameCounter,
        _: std::time::Duration,
    ) -> Out<FrameCounter, ()> {
        if let Some(scene) = self.scene.as_mut() {
            scene.update_world_transform_all();
            scene.write_to_buffers(&ctx.queue, &ctx.device);
        }
        state.progress();
        Out::Empty
    }

    fn on_window_events(
        &mut self,
        _: &Context,
        _: &mut FrameCounter,
        _: &view_ngin::WindowEvent,
    ) -> Out<FrameCounter, ()> {
        Out::Empty
    }

    fn on_render(&self) -> Render<'_> {
        match &self.scene {
            Some(scene) => Render::Defaults(scene.get_render()),
            None => Render::None,
        }
    }

    fn render_to_texture(
        &self,
        ctx: &Context,
        state: &mut FrameCounter,
        texture: &mut Frame,
    ) -> Result<ImageTestResult, Error> {
        (self.validate)(ctx, state, texture)
    }
}

/// Runs the flow built by an async `InitContext -> TestRender` constructor
/// until its validation passes.
#[macro_export]
macro_rules! golden_image_test {
    ($constructor:expr) => {{
        use crate::common::test_utils::FrameCounter;
        use view_ngin::flow::{FlowConsturctor, GraphicsFlow};
        let constructor: FlowConsturctor<FrameCounter, ()> = Box::new(|init| {
            Box::pin(async move {
                let flow: Box<dyn GraphicsFlow<FrameCounter, ()>> =
                    Box::new(($constructor)(init).await);
                flow
            })
        });

        view_ngin::flow::run(vec![constructor])
            .expect("Failed to run flow for integration test.");
    }};
}
