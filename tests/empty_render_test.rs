#![cfg(feature = "integration-tests")]

#[macro_use]
mod common;

use common::test_utils::{FrameCounter, TestRender};
use view_ngin::{
    context::{Context, InitContext},
    flow::ImageTestResult,
};
use wgpu::Color;

#[test]
fn should_render_clear_colour() {
    golden_image_test!(|_: InitContext| async move {
        TestRender::new(
            None,
            |ctx: &mut Context| {
                ctx.clear_colour = Color::WHITE;
                ctx.camera.camera.position = [0.0, 5.0, 2.0].into();
            },
            |_, state: &mut FrameCounter, texture| {
                if state.frame() == 0 {
                    return Ok(ImageTestResult::Waiting);
                }
                let colour = Color::WHITE;
                let f_to_u8 = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
                let desired_pixel = image::Rgba([
                    f_to_u8(colour.r),
                    f_to_u8(colour.g),
                    f_to_u8(colour.b),
                    f_to_u8(colour.a),
                ]);
                for pixel in texture.pixels() {
                    assert_eq!(*pixel, desired_pixel);
                }
                Ok(ImageTestResult::Passed)
            },
        )
    });
}
