//! Frame-level tests of the renderer against the recording backend.
//!
//! Each test builds a small scene, renders one or more frames and checks
//! the recorded passes, draws and frame statistics.

mod common;

use common::{draws_in, pipeline_labels, Assets, HEIGHT, WIDTH};
use glam::{Mat4, Vec3, Vec4};
use rstest::rstest;
use scene_renderer::backend::recording::RecordedCommand;
use scene_renderer::backend::GraphicsBackend;
use scene_renderer::pipeline::shading::{accumulate, SurfacePoint};
use scene_renderer::resources::TextureData;
use scene_renderer::scene::LightEntity;
use scene_renderer::shader::Template;
use scene_renderer::{RenderMode, Renderer, RendererConfig};

fn renderer(mode: RenderMode) -> Renderer {
    Renderer::new(RendererConfig {
        render_mode: mode,
        ..Default::default()
    })
}

// ============================================================================
// Render modes
// ============================================================================

#[rstest]
#[case::flat(RenderMode::Flat, 1, 0)]
#[case::textured(RenderMode::Textured, 1, 0)]
#[case::lights(RenderMode::Lights, 2, 2)]
fn test_forward_draws_per_mode(#[case] mode: RenderMode, #[case] main_draws: usize, #[case] light_passes: usize) {
    common::init_logging();
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));
    scene.add_entity(common::point_light("key", Vec3::new(0.0, 3.0, 0.0)));
    scene.add_entity(common::point_light("fill", Vec3::new(3.0, 0.0, 3.0)));

    let mut backend = common::backend();
    let mut renderer = renderer(mode);
    let stats = renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");

    assert_eq!(draws_in(&backend, "main"), main_draws);
    assert_eq!(stats.draw_calls, main_draws);
    assert_eq!(stats.light_passes, light_passes);
    assert_eq!(stats.culled_nodes, 0);
    assert!(backend.pass("gbuffer").is_none());
    assert_eq!(backend.frames_presented(), 1);
}

#[test]
fn test_extra_lights_are_additive_passes() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));
    scene.add_entity(common::point_light("key", Vec3::new(0.0, 3.0, 0.0)));
    scene.add_entity(common::point_light("fill", Vec3::new(3.0, 0.0, 3.0)));
    scene.add_entity(common::point_light("rim", Vec3::new(-3.0, 0.0, -3.0)));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Lights);
    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");

    let main = backend.pass("main").expect("main pass");
    assert_eq!(
        pipeline_labels(&backend, main),
        vec!["lights".to_string(), "lights_additive".to_string()]
    );
    assert_eq!(main.draw_count(), 3);
}

#[test]
fn test_lights_out_of_range_leave_an_ambient_pass() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));
    scene.add_entity(common::light(
        "far",
        LightEntity::point(Vec3::ONE, 1.0, 5.0),
        Mat4::from_translation(Vec3::new(100.0, 0.0, 0.0)),
    ));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Lights);
    let stats = renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");

    assert_eq!(stats.draw_calls, 1);
    let main = backend.pass("main").expect("main pass");
    assert_eq!(pipeline_labels(&backend, main), vec!["lights".to_string()]);
}

#[test]
fn test_deferred_composites_one_pass_per_light() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));
    scene.add_entity(common::point_light("key", Vec3::new(0.0, 3.0, 0.0)));
    scene.add_entity(common::point_light("fill", Vec3::new(3.0, 0.0, 3.0)));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Deferred);
    let stats = renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");

    let gbuffer = backend.pass("gbuffer").expect("gbuffer pass");
    assert_eq!(gbuffer.color_targets.len(), 3);
    assert_eq!(gbuffer.draw_count(), 1);

    let composite = backend.pass("composite").expect("composite pass");
    assert_eq!(
        pipeline_labels(&backend, composite),
        vec!["deferred_ambient".to_string(), "deferred_light_additive".to_string()]
    );
    assert_eq!(composite.draw_count(), 3);
    assert_eq!(stats.light_passes, 2);
    assert!(backend.pass("main").is_none());
}

#[test]
fn test_deferred_skips_blended_materials() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("solid", Vec3::ZERO));
    scene.add_entity(assets.glass_at("glass", Vec3::new(1.5, 0.0, 0.0)));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Deferred);
    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    assert_eq!(draws_in(&backend, "gbuffer"), 1);

    renderer.render_mode = RenderMode::Flat;
    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    let main = backend.pass("main").expect("main pass");
    assert_eq!(main.draw_count(), 2);
    assert!(pipeline_labels(&backend, main).contains(&"flat_blend".to_string()));
}

// ============================================================================
// Culling
// ============================================================================

#[test]
fn test_off_screen_nodes_are_culled() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("visible", Vec3::ZERO));
    scene.add_entity(assets.cube_at("behind", Vec3::new(0.0, 0.0, 50.0)));
    scene.add_entity(assets.cube_at("far_right", Vec3::new(1000.0, 0.0, 0.0)));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Flat);
    let stats = renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");

    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.culled_nodes, 2);
}

#[test]
fn test_hidden_entities_are_not_drawn() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("a", Vec3::ZERO));
    scene.add_entity(assets.cube_at("b", Vec3::new(1.5, 0.0, 0.0)));
    if let Some(b) = scene.entity_by_name_mut("b") {
        b.visible = false;
    }

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Flat);
    let stats = renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.culled_nodes, 0);
}

// ============================================================================
// Shadows
// ============================================================================

#[test]
fn test_spot_shadow_map_projection() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));
    let spot = scene.add_entity(common::spot_light_above("spot", 5.0));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Lights);
    let stats = renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    assert_eq!(stats.shadow_maps_rendered, 1);

    let light = scene.entities[spot].as_light().expect("light entity");
    let shadow = light.shadow.as_ref().expect("shadow map");
    let texture = backend.texture_of_view(shadow.target.view).expect("shadow texture");
    assert_eq!((texture.width, texture.height), (1024, 1024));

    // The light's own position sits on the eye plane: w collapses to zero
    let eye = shadow.view_projection * Vec4::new(0.0, 5.0, 0.0, 1.0);
    assert!(eye.w.abs() < 1e-4, "w = {}", eye.w);

    let faced = shadow.view_projection * Vec4::new(0.0, 0.0, 0.0, 1.0);
    assert!(faced.w > 0.0);
    let ndc = faced.truncate() / faced.w;
    assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0, "ndc = {ndc}");
    assert!((0.0..=1.0).contains(&ndc.z), "ndc = {ndc}");

    let pass = backend.pass("shadow:spot").expect("shadow pass");
    assert!(pass.color_targets.is_empty());
    assert_eq!(pass.depth_target, Some(shadow.target.view));
    assert_eq!(pipeline_labels(&backend, pass), vec!["flat_depth".to_string()]);
    assert_eq!(pass.draw_count(), 1);
}

#[test]
fn test_render_mode_survives_shadow_generation() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));
    scene.add_entity(common::spot_light_above("spot", 5.0));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Lights);
    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");

    assert_eq!(renderer.render_mode, RenderMode::Lights);
    let main = backend.pass("main").expect("main pass");
    assert_eq!(pipeline_labels(&backend, main), vec!["lights".to_string()]);
    assert!(renderer.lights()[0].shadow.is_some());
}

#[test]
fn test_directional_shadow_is_clamped_to_device_limit() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));
    let sun = scene.add_entity(common::light(
        "sun",
        LightEntity::directional(Vec3::ONE, 1.0, 40.0).with_shadows(0.001),
        Mat4::from_translation(Vec3::new(0.0, 20.0, 0.0)) * Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2),
    ));

    let mut backend = common::backend().with_max_texture_dimension(4096);
    let mut renderer = renderer(RenderMode::Lights);
    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");

    let light = scene.entities[sun].as_light().expect("light entity");
    let view = light.shadow.as_ref().expect("shadow map").target.view;
    let texture = backend.texture_of_view(view).expect("shadow texture");
    assert_eq!((texture.width, texture.height), (4096, 4096));
}

#[test]
fn test_shadow_map_is_reused_and_released() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));
    let spot = scene.add_entity(common::spot_light_above("spot", 5.0));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Lights);
    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    let first = scene.entities[spot]
        .as_light()
        .and_then(|l| l.shadow.as_ref())
        .map(|s| s.target.view);
    let textures = backend.live_texture_count();

    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    let second = scene.entities[spot]
        .as_light()
        .and_then(|l| l.shadow.as_ref())
        .map(|s| s.target.view);
    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(backend.live_texture_count(), textures);

    if let Some(light) = scene.entities[spot].as_light_mut() {
        light.cast_shadows = false;
    }
    let stats = renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    assert_eq!(stats.shadow_maps_rendered, 0);
    assert!(scene.entities[spot].as_light().is_some_and(|l| l.shadow.is_none()));
    assert_eq!(backend.live_texture_count(), textures - 1);
}

#[test]
fn test_removed_light_releases_its_shadow_map() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));
    scene.add_entity(common::spot_light_above("spot", 5.0));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Lights);
    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    let textures = backend.live_texture_count();

    assert!(scene.remove_entity("spot").is_some());
    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    assert_eq!(backend.live_texture_count(), textures - 1);
}

#[test]
fn test_shadow_maps_of_dropped_scenes_are_released() {
    let assets = Assets::new();
    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Lights);

    let live: Vec<usize> = (0..4)
        .map(|_| {
            let mut scene = common::scene();
            scene.add_entity(assets.cube_at("cube", Vec3::ZERO));
            scene.add_entity(common::spot_light_above("spot", 5.0));
            renderer
                .render_scene(&mut backend, &mut scene, &assets.registry)
                .expect("frame");
            backend.live_texture_count()
        })
        .collect();
    assert!(live.windows(2).all(|w| w[0] == w[1]), "live textures per scene: {live:?}");
}

#[test]
fn test_point_lights_never_cast_shadows() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));
    scene.add_entity(common::light(
        "bulb",
        LightEntity::point(Vec3::ONE, 1.0, 20.0).with_shadows(0.001),
        Mat4::from_translation(Vec3::new(0.0, 3.0, 0.0)),
    ));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Lights);
    let stats = renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    assert_eq!(stats.shadow_maps_rendered, 0);
    assert!(backend.pass("shadow:bulb").is_none());
}

// ============================================================================
// Lighting model
// ============================================================================

#[test]
fn test_directional_light_color_is_bounded() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("floor", Vec3::ZERO));
    scene.add_entity(common::light(
        "sun",
        LightEntity::directional(Vec3::ONE, 1.0, 50.0),
        Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2),
    ));

    let mut renderer = renderer(RenderMode::Lights);
    renderer.setup_scene(&mut scene, &assets.registry);
    let ambient = scene.ambient_light;
    let passes: Vec<_> = renderer.lights().iter().map(|l| l.gpu_data(ambient, 1.0)).collect();
    assert_eq!(passes.len(), 1);

    let albedo = Vec3::splat(0.5);
    let top = SurfacePoint::new(Vec3::new(0.0, 0.5, 0.0), Vec3::Y, albedo);
    let color = accumulate(&passes, &top);
    let diffuse = albedo * Vec3::ONE;
    assert!(color.cmpge(ambient).all(), "color = {color}");
    assert!(color.cmple(ambient + diffuse).all(), "color = {color}");

    // A face turned away only keeps the ambient term
    let bottom = SurfacePoint::new(Vec3::new(0.0, -0.5, 0.0), Vec3::NEG_Y, albedo);
    assert!(accumulate(&passes, &bottom).abs_diff_eq(ambient * albedo, 1e-5));
}

// ============================================================================
// Skybox and overlays
// ============================================================================

#[rstest]
#[case::flat(RenderMode::Flat, false)]
#[case::textured(RenderMode::Textured, true)]
#[case::lights(RenderMode::Lights, true)]
#[case::deferred(RenderMode::Deferred, false)]
fn test_skybox_drawn_in_forward_lit_modes(#[case] mode: RenderMode, #[case] expected: bool) {
    let mut assets = Assets::new();
    assets
        .registry
        .add_texture(TextureData::solid_color("sky", [90, 140, 220, 255]));
    let mut scene = common::scene();
    scene.skybox = Some("sky".to_string());
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));

    let mut backend = common::backend();
    let mut renderer = renderer(mode);
    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    assert!(renderer.skybox().is_some());

    let drew_sky = backend
        .passes()
        .iter()
        .flat_map(|pass| pipeline_labels(&backend, pass))
        .any(|label| label == "skybox");
    assert_eq!(drew_sky, expected);
}

#[test]
fn test_missing_skybox_texture_is_ignored() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.skybox = Some("nowhere".to_string());
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Lights);
    let stats = renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    assert!(renderer.skybox().is_none());
    assert_eq!(stats.draw_calls, 1);
}

#[test]
fn test_no_overlay_pass_by_default() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Flat);
    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    assert!(backend.pass("overlay").is_none());
}

#[test]
fn test_boundaries_overlay_draws_drawn_nodes() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("a", Vec3::ZERO));
    scene.add_entity(assets.cube_at("b", Vec3::new(1.5, 0.0, 0.0)));
    scene.add_entity(assets.cube_at("culled", Vec3::new(1000.0, 0.0, 0.0)));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Flat);
    renderer.show_boundaries = true;
    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");

    let overlay = backend.pass("overlay").expect("overlay pass");
    assert_eq!(overlay.draw_count(), 2);
    assert_eq!(pipeline_labels(&backend, overlay), vec!["lines".to_string()]);
}

#[test]
fn test_gbuffer_and_shadow_tiles() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));
    scene.add_entity(common::spot_light_above("spot", 5.0));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Deferred);
    renderer.show_shadowmaps = true;
    renderer.show_gbuffers = true;
    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");

    // One shadow map, three colour attachments and the depth attachment
    let overlay = backend.pass("overlay").expect("overlay pass");
    assert_eq!(overlay.draw_count(), 5);

    let tile = (WIDTH / 4).min(HEIGHT / 4) as f32;
    let tiles: Vec<(f32, f32)> = overlay
        .commands
        .iter()
        .filter_map(|c| match c {
            RecordedCommand::SetViewport { x, y, width, .. } if *width == tile => Some((*x, *y)),
            _ => None,
        })
        .collect();
    assert_eq!(tiles.len(), 5);
    assert_eq!(tiles[0], (0.0, HEIGHT as f32 - tile));
    assert_eq!(tiles[4], (0.0, HEIGHT as f32 - 2.0 * tile));
}

#[test]
fn test_gbuffer_tiles_need_deferred_mode() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Lights);
    renderer.show_gbuffers = true;
    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    assert_eq!(draws_in(&backend, "overlay"), 0);
}

// ============================================================================
// Shader failures
// ============================================================================

#[test]
fn test_broken_template_disables_mode_until_fixed() {
    common::init_logging();
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Lights);
    renderer
        .shaders_mut()
        .set_template_override(Template::Mesh, Some("fn broken( {".to_string()));

    let stats = renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame survives a broken shader");
    assert_eq!(stats.draw_calls, 0);
    assert!(backend.pass("main").is_some());

    // Still broken: retried and skipped again
    let stats = renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    assert_eq!(stats.draw_calls, 0);

    renderer.shaders_mut().set_template_override(Template::Mesh, None);
    let stats = renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    assert_eq!(stats.draw_calls, 1);
}

// ============================================================================
// Frame lifecycle
// ============================================================================

#[test]
fn test_resize_reallocates_gbuffer() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Deferred);
    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    let textures = backend.live_texture_count();

    backend.resize(400, 300);
    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    let gbuffer = backend.pass("gbuffer").expect("gbuffer pass");
    let albedo = backend
        .texture_of_view(gbuffer.color_targets[0])
        .expect("albedo target");
    assert_eq!((albedo.width, albedo.height), (400, 300));
    assert_eq!(backend.live_texture_count(), textures);
}

#[test]
fn test_pipelines_are_built_once() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));
    scene.add_entity(common::point_light("key", Vec3::new(0.0, 3.0, 0.0)));

    let mut backend = common::backend();
    let mut renderer = renderer(RenderMode::Lights);
    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    let pipelines = backend.pipeline_count();
    for _ in 0..3 {
        renderer
            .render_scene(&mut backend, &mut scene, &assets.registry)
            .expect("frame");
    }
    assert_eq!(backend.pipeline_count(), pipelines);
    assert_eq!(backend.frames_presented(), 4);
}
