//! The debug panel and the egui layer it is drawn with.
//!
//! A [`Gui`] is a list of folders holding sliders, toggles and buttons. Each
//! controller carries a binding value chosen by the app; edits come back from
//! [`Gui::show`] as [`GuiChange`]s naming that binding, and the app applies
//! them to whatever the binding stands for. Controllers marked with
//! [`Controller::listen`] are refreshed from live values with [`Gui::refresh`].
//!
//! [`UiLayer`] is owned by the context. It feeds winit events to egui, runs
//! the flows' `on_gui` hooks once per frame and draws the result on top of the
//! finished frame. Egui handles focus, so `Tab` walks the controls and the
//! arrow keys step a focused slider. `H` hides or shows the panel while no
//! text field has the keyboard.

use std::fmt::Debug;

use winit::{event::WindowEvent, window::Window};

/// Offset of the panel from the top right corner, in points.
const PANEL_OFFSET: [f32; 2] = [-8.0, 8.0];

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlKind {
    Slider { min: f32, max: f32, step: f32 },
    Toggle,
    Button,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GuiValue {
    Number(f32),
    Bool(bool),
    Pressed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GuiChange<B> {
    pub binding: B,
    pub value: GuiValue,
}

#[derive(Clone, Debug)]
pub struct Controller<B> {
    pub name: String,
    pub binding: B,
    pub kind: ControlKind,
    /// Sliders hold their number, toggles 0 or 1, buttons nothing.
    value: f32,
    listening: bool,
}

impl<B> Controller<B> {
    /// Refresh this controller from live values every frame.
    pub fn listen(&mut self) -> &mut Self {
        self.listening = true;
        self
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn is_on(&self) -> bool {
        self.value > 0.5
    }

    fn ui(&mut self, ui: &mut egui::Ui) -> Option<GuiValue> {
        match self.kind {
            ControlKind::Slider { min, max, step } => {
                let mut value = self.value;
                let mut slider = egui::Slider::new(&mut value, min..=max).text(self.name.as_str());
                if step > 0.0 {
                    slider = slider.step_by(step as f64);
                }
                if !ui.add(slider).changed() {
                    return None;
                }
                self.value = value;
                Some(GuiValue::Number(value))
            }
            ControlKind::Toggle => {
                let mut on = self.is_on();
                if !ui.checkbox(&mut on, self.name.as_str()).changed() {
                    return None;
                }
                self.value = if on { 1.0 } else { 0.0 };
                Some(GuiValue::Bool(on))
            }
            ControlKind::Button => ui
                .button(self.name.as_str())
                .clicked()
                .then_some(GuiValue::Pressed),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Folder<B> {
    pub name: String,
    pub controllers: Vec<Controller<B>>,
    is_open: bool,
}

impl<B> Folder<B> {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            controllers: Vec::new(),
            is_open: true,
        }
    }

    fn push(&mut self, name: &str, binding: B, kind: ControlKind, value: f32) -> &mut Controller<B> {
        self.controllers.push(Controller {
            name: name.to_string(),
            binding,
            kind,
            value,
            listening: false,
        });
        let last = self.controllers.len() - 1;
        &mut self.controllers[last]
    }

    pub fn add_slider(
        &mut self,
        name: &str,
        binding: B,
        value: f32,
        min: f32,
        max: f32,
        step: f32,
    ) -> &mut Controller<B> {
        self.push(
            name,
            binding,
            ControlKind::Slider { min, max, step },
            value.clamp(min, max),
        )
    }

    pub fn add_toggle(&mut self, name: &str, binding: B, on: bool) -> &mut Controller<B> {
        self.push(name, binding, ControlKind::Toggle, if on { 1.0 } else { 0.0 })
    }

    pub fn add_button(&mut self, name: &str, binding: B) -> &mut Controller<B> {
        self.push(name, binding, ControlKind::Button, 0.0)
    }

    pub fn open(&mut self) -> &mut Self {
        self.is_open = true;
        self
    }

    pub fn close(&mut self) -> &mut Self {
        self.is_open = false;
        self
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }
}

/// A header that shows `is_open` and returns the state after this pass's clicks.
fn collapsing<R>(
    ui: &mut egui::Ui,
    title: &str,
    is_open: bool,
    body: impl FnOnce(&mut egui::Ui) -> R,
) -> (bool, Option<R>) {
    let response = egui::CollapsingHeader::new(title)
        .open(Some(is_open))
        .show(ui, body);
    let is_open = if response.header_response.clicked() { !is_open } else { is_open };
    (is_open, response.body_returned)
}

#[derive(Debug)]
pub struct Gui<B> {
    pub title: String,
    folders: Vec<Folder<B>>,
    is_open: bool,
    hidden: bool,
}

impl<B: Clone + PartialEq> Gui<B> {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            folders: Vec::new(),
            is_open: true,
            hidden: false,
        }
    }

    pub fn add_folder(&mut self, name: &str) -> &mut Folder<B> {
        self.folders.push(Folder::new(name));
        let last = self.folders.len() - 1;
        &mut self.folders[last]
    }

    pub fn folder(&self, name: &str) -> Option<&Folder<B>> {
        self.folders.iter().find(|f| f.name == name)
    }

    pub fn folders(&self) -> &[Folder<B>] {
        &self.folders
    }

    pub fn remove_folder(&mut self, name: &str) -> bool {
        let before = self.folders.len();
        self.folders.retain(|f| f.name != name);
        before != self.folders.len()
    }

    pub fn open(&mut self) {
        self.is_open = true;
    }

    pub fn close(&mut self) {
        self.is_open = false;
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn controller(&self, binding: &B) -> Option<&Controller<B>> {
        self.folders
            .iter()
            .flat_map(|f| f.controllers.iter())
            .find(|c| &c.binding == binding)
    }

    /// Pull fresh values into every listening controller.
    pub fn refresh(&mut self, live: impl Fn(&B) -> Option<f32>) {
        for c in self
            .folders
            .iter_mut()
            .flat_map(|f| f.controllers.iter_mut())
            .filter(|c| c.listening)
        {
            if let Some(value) = live(&c.binding) {
                c.value = value;
            }
        }
    }

    /// Lay the panel out for this egui pass. Returns the edits made in it.
    pub fn show(&mut self, ctx: &egui::Context) -> Vec<GuiChange<B>> {
        if !ctx.wants_keyboard_input() && ctx.input(|i| i.key_pressed(egui::Key::H)) {
            self.hidden = !self.hidden;
        }
        let mut changes = Vec::new();
        if self.hidden {
            return changes;
        }

        let Self {
            title,
            folders,
            is_open,
            ..
        } = self;
        egui::Window::new(title.as_str())
            .title_bar(false)
            .resizable(false)
            .anchor(egui::Align2::RIGHT_TOP, PANEL_OFFSET)
            .show(ctx, |ui| {
                let (open, _) = collapsing(ui, title, *is_open, |ui| {
                    for folder in folders.iter_mut() {
                        let (open, _) = collapsing(ui, &folder.name, folder.is_open, |ui| {
                            for c in folder.controllers.iter_mut() {
                                if let Some(value) = c.ui(ui) {
                                    changes.push(GuiChange {
                                        binding: c.binding.clone(),
                                        value,
                                    });
                                }
                            }
                        });
                        folder.is_open = open;
                    }
                });
                *is_open = open;
            });
        changes
    }
}

/// The egui pass of one frame, waiting to be drawn.
struct UiFrame {
    primitives: Vec<egui::ClippedPrimitive>,
    textures_delta: egui::TexturesDelta,
    pixels_per_point: f32,
}

/// Egui input, output and drawing for the whole window.
pub struct UiLayer {
    egui: egui::Context,
    input: egui_winit::State,
    renderer: egui_wgpu::Renderer,
    frame: Option<UiFrame>,
}

impl Debug for UiLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiLayer")
            .field("pending_frame", &self.frame.is_some())
            .finish()
    }
}

impl UiLayer {
    pub(crate) fn new(window: &Window, device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let egui = egui::Context::default();
        let input = egui_winit::State::new(
            egui.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            Some(device.limits().max_texture_dimension_2d as usize),
        );
        let renderer = egui_wgpu::Renderer::new(device, format, egui_wgpu::RendererOptions::default());
        Self {
            egui,
            input,
            renderer,
            frame: None,
        }
    }

    pub fn context(&self) -> &egui::Context {
        &self.egui
    }

    /// Pass a window event to egui. Returns whether egui used it up.
    pub(crate) fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.input.on_window_event(window, event).consumed
    }

    /// Run one egui pass with `build` laying out every panel.
    pub(crate) fn run(&mut self, window: &Window, build: impl FnMut(&egui::Context)) {
        let raw_input = self.input.take_egui_input(window);
        let egui::FullOutput {
            platform_output,
            textures_delta,
            shapes,
            pixels_per_point,
            ..
        } = self.egui.run(raw_input, build);
        self.input.handle_platform_output(window, platform_output);

        let primitives = self.egui.tessellate(shapes, pixels_per_point);
        // texture uploads of a pass that was never drawn must not get lost
        let textures_delta = match self.frame.take() {
            Some(skipped) => {
                let mut delta = skipped.textures_delta;
                delta.append(textures_delta);
                delta
            }
            None => textures_delta,
        };
        self.frame = Some(UiFrame {
            primitives,
            textures_delta,
            pixels_per_point,
        });
    }

    /// Draw the last pass on top of `view`.
    pub(crate) fn draw(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        size_in_pixels: [u32; 2],
    ) {
        let Some(frame) = self.frame.take() else {
            return;
        };
        let screen = egui_wgpu::ScreenDescriptor {
            size_in_pixels,
            pixels_per_point: frame.pixels_per_point,
        };
        for (id, delta) in &frame.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, delta);
        }
        self.renderer
            .update_buffers(device, queue, encoder, &frame.primitives, &screen);

        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Gui Render Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    occlusion_query_set: None,
                    timestamp_writes: None,
                })
                .forget_lifetime();
            self.renderer.render(&mut pass, &frame.primitives, &screen);
        }

        for id in &frame.textures_delta.free {
            self.renderer.free_texture(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    enum Binding {
        Speed,
        Wireframe,
        PlayAll,
    }

    fn gui() -> Gui<Binding> {
        let mut gui = Gui::new("Controls");
        let folder = gui.add_folder("Display");
        folder.add_toggle("wireframe", Binding::Wireframe, false);
        let folder = gui.add_folder("Animation");
        folder.add_slider("playback speed", Binding::Speed, 1.0, 0.0, 1.0, 0.01);
        folder.add_button("play all", Binding::PlayAll);
        gui
    }

    fn key(key: egui::Key) -> egui::RawInput {
        egui::RawInput {
            events: vec![egui::Event::Key {
                key,
                physical_key: None,
                pressed: true,
                repeat: false,
                modifiers: egui::Modifiers::NONE,
            }],
            ..Default::default()
        }
    }

    /// One egui pass over `gui`, returning the edits and the painted shapes.
    fn show(
        ctx: &egui::Context,
        gui: &mut Gui<Binding>,
        input: egui::RawInput,
    ) -> (Vec<GuiChange<Binding>>, usize) {
        let mut changes = Vec::new();
        let output = ctx.run(input, |ctx| changes = gui.show(ctx));
        (changes, output.shapes.len())
    }

    #[test]
    fn sliders_clamp_their_start_value() {
        let mut gui = gui();
        gui.add_folder("Extra")
            .add_slider("exposure", Binding::Speed, 5.0, 0.0, 2.0, 0.01);
        let extra = gui.folder("Extra").expect("folder");
        assert_eq!(extra.controllers[0].value(), 2.0);
        assert_eq!(
            extra.controllers[0].kind,
            ControlKind::Slider {
                min: 0.0,
                max: 2.0,
                step: 0.01
            }
        );
    }

    #[test]
    fn a_pass_without_input_changes_nothing() {
        let ctx = egui::Context::default();
        let mut gui = gui();
        for _ in 0..3 {
            let (changes, _) = show(&ctx, &mut gui, egui::RawInput::default());
            assert!(changes.is_empty());
        }
        assert!(gui.is_open());
        assert!(gui.folders().iter().all(Folder::is_open));
    }

    #[test]
    fn closed_folders_stay_closed_across_passes() {
        let ctx = egui::Context::default();
        let mut gui = gui();
        gui.add_folder("Cameras").close();
        gui.close();
        for _ in 0..3 {
            show(&ctx, &mut gui, egui::RawInput::default());
        }
        assert!(!gui.is_open());
        assert_eq!(gui.folder("Cameras").map(Folder::is_open), Some(false));
        assert_eq!(gui.folder("Display").map(Folder::is_open), Some(true));

        gui.open();
        show(&ctx, &mut gui, egui::RawInput::default());
        assert!(gui.is_open());
    }

    #[test]
    fn h_hides_and_shows_the_panel() {
        let ctx = egui::Context::default();
        let mut gui = gui();
        show(&ctx, &mut gui, egui::RawInput::default());
        let (_, visible) = show(&ctx, &mut gui, egui::RawInput::default());
        assert!(visible > 0);

        show(&ctx, &mut gui, key(egui::Key::H));
        assert!(gui.hidden);
        let (changes, painted) = show(&ctx, &mut gui, egui::RawInput::default());
        assert!(changes.is_empty());
        assert_eq!(painted, 0);

        show(&ctx, &mut gui, key(egui::Key::H));
        assert!(!gui.hidden);
    }

    #[test]
    fn removing_folders_reports_whether_one_was_there() {
        let mut gui = gui();
        assert!(gui.remove_folder("Animation"));
        assert!(!gui.remove_folder("Animation"));
        assert_eq!(gui.folders().len(), 1);
        assert!(gui.controller(&Binding::Speed).is_none());
    }

    #[test]
    fn listening_controllers_follow_live_values() {
        let mut gui = gui();
        gui.add_folder("Live")
            .add_slider("speed", Binding::Speed, 1.0, 0.0, 1.0, 0.01)
            .listen();
        gui.remove_folder("Animation");
        gui.refresh(|binding| (*binding == Binding::Speed).then_some(0.25));
        assert_eq!(gui.controller(&Binding::Speed).map(Controller::value), Some(0.25));
        // not listening
        assert_eq!(gui.controller(&Binding::Wireframe).map(Controller::value), Some(0.0));
    }
}
