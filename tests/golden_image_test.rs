#![cfg(feature = "integration-tests")]

#[macro_use]
mod common;

use common::test_utils::{FrameCounter, TestRender};
use view_ngin::{
    apps::{basic, clear_colour},
    context::{Context, InitContext},
    flow::ImageTestResult,
    pipelines::light::Light,
};

fn differs(a: &image::Rgba<u8>, b: &image::Rgba<u8>) -> bool {
    a.0.iter().zip(b.0.iter()).any(|(x, y)| x.abs_diff(*y) > 10)
}

#[test]
fn should_render_the_lit_cube_over_the_sky() {
    golden_image_test!(|_: InitContext| async move {
        TestRender::new(
            Some(Box::new(basic::cube())),
            |ctx: &mut Context| {
                ctx.clear_colour = clear_colour(0x87ceeb);
                view_ngin::apps::set_camera(ctx, 35.0, 0.1, 100.0, [0.0, 0.0, 10.0]);
                ctx.light.set_lights(vec![
                    Light::directional(0xffffff, 8.0, [10.0, 10.0, 10.0]),
                    Light::ambient(0xffffff, 2.0),
                ]);
            },
            |_, state: &mut FrameCounter, actual| {
                if state.frame() < 2 {
                    return Ok(ImageTestResult::Waiting);
                }
                let (width, height) = actual.dimensions();
                let corner = *actual.get_pixel(0, 0);
                let centre = *actual.get_pixel(width / 2, height / 2);
                assert_eq!(corner, *actual.get_pixel(width - 1, height - 1));
                assert!(differs(&corner, &centre), "cube missing: {:?} at the centre", centre);
                Ok(ImageTestResult::Passed)
            },
        )
    });
}
