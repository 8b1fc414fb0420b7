//! # Headless Demo
//!
//! Renders a scene through the recording backend and prints what the frame
//! did: passes, draw calls, culling and light passes. Also estimates the
//! colour under the centre pixel with the CPU copy of the lighting model.
//!
//! ```text
//! cargo run --example headless -- --mode deferred --frames 3
//! cargo run --example headless -- --scene assets/scene.json --meshes assets
//! ```

use clap::Parser;
use glam::{Mat4, Vec2, Vec3};
use scene_renderer::backend::RecordingBackend;
use scene_renderer::pipeline::shading::{accumulate, SurfacePoint};
use scene_renderer::resources::{Material, Mesh, ResourceRegistry};
use scene_renderer::scene::description::MeshCachePrefabLoader;
use scene_renderer::scene::{Camera, Entity, GpuLightData, LightEntity, Node, Scene};
use scene_renderer::{RenderMode, Renderer, RendererConfig};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum CliRenderMode {
    Flat,
    Textured,
    Lights,
    Deferred,
}

impl From<CliRenderMode> for RenderMode {
    fn from(mode: CliRenderMode) -> Self {
        match mode {
            CliRenderMode::Flat => RenderMode::Flat,
            CliRenderMode::Textured => RenderMode::Textured,
            CliRenderMode::Lights => RenderMode::Lights,
            CliRenderMode::Deferred => RenderMode::Deferred,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "headless", about = "Render a scene without a window and report frame statistics")]
struct Args {
    /// Render mode; overrides the config file
    #[arg(long, value_enum)]
    mode: Option<CliRenderMode>,

    #[arg(long, default_value = "1280")]
    width: u32,

    #[arg(long, default_value = "720")]
    height: u32,

    /// Number of frames to render
    #[arg(long, default_value = "1")]
    frames: u32,

    /// JSON scene description; a built-in scene is used when absent
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Directory holding the mesh cache files the scene refers to
    #[arg(long, default_value = ".")]
    meshes: PathBuf,

    /// Renderer configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Draw bounding boxes and debug tiles
    #[arg(long)]
    debug: bool,
}

/// Grid of gray cubes on a floor, lit by a shadowed spot and a point light
fn demo_scene(registry: &mut ResourceRegistry, aspect: f32) -> Scene {
    let cube = registry.add_mesh(Mesh::cube());
    let floor = registry.add_mesh(Mesh::plane(20.0, 20.0, 1));
    let gray = registry.add_material(Material::flat("gray", Vec3::splat(0.6)));
    let glass = registry.add_material(Material::glass("glass", glam::Vec4::new(0.3, 0.6, 1.0, 0.4)));

    let mut scene = Scene::new();
    scene.ambient_light = Vec3::splat(0.08);
    scene.background_color = Vec3::new(0.05, 0.05, 0.1);
    scene.main_camera = Camera::perspective(60.0, aspect, 0.1, 200.0);
    scene.main_camera.look_at(Vec3::new(0.0, 6.0, 12.0), Vec3::ZERO, Vec3::Y);

    let mut root = Node::new("ground").with_mesh(floor, Some(gray));
    for x in -2..=2 {
        for z in -2..=2 {
            let material = if (x + z) % 3 == 0 { glass } else { gray };
            let position = Vec3::new(x as f32 * 2.5, 0.5, z as f32 * 2.5);
            root.add_child(
                Node::new(&format!("cube_{x}_{z}"))
                    .with_mesh(cube, Some(material))
                    .with_local(Mat4::from_translation(position)),
            );
        }
    }
    scene.add_entity(Entity::prefab("ground", "ground.mesh", root));

    let mut spot = Entity::light(
        "spot",
        LightEntity::spot(Vec3::new(1.0, 0.95, 0.8), 2.0, 40.0, 25.0, 35.0).with_shadows(0.002),
    );
    spot.root.local = Mat4::from_translation(Vec3::new(0.0, 12.0, 0.0)) * Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2);
    scene.add_entity(spot);

    let mut bulb = Entity::light("bulb", LightEntity::point(Vec3::new(0.4, 0.6, 1.0), 1.0, 15.0));
    bulb.root.local = Mat4::from_translation(Vec3::new(-5.0, 3.0, 5.0));
    scene.add_entity(bulb);

    scene
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RendererConfig::from_file(path)?,
        None => RendererConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.render_mode = mode.into();
    }

    let mut registry = ResourceRegistry::new();
    let mut scene = match &args.scene {
        Some(path) => {
            let mut loader = MeshCachePrefabLoader::new(&args.meshes);
            Scene::load_from_file(path, &mut loader, &mut registry)?
        }
        None => demo_scene(&mut registry, args.width as f32 / args.height.max(1) as f32),
    };

    let mut backend = RecordingBackend::new(args.width, args.height);
    let mut renderer = Renderer::new(config);
    renderer.show_boundaries = args.debug;
    renderer.show_shadowmaps = args.debug;
    renderer.show_gbuffers = args.debug;

    for frame in 0..args.frames.max(1) {
        let stats = renderer.render_scene(&mut backend, &mut scene, &registry)?;
        log::info!(
            "Frame {frame}: {} draws, {} culled, {} light passes, {} shadow maps, {} skipped",
            stats.draw_calls,
            stats.culled_nodes,
            stats.light_passes,
            stats.shadow_maps_rendered,
            stats.skipped_draws
        );
    }

    println!("Render mode: {:?}", renderer.render_mode);
    for pass in backend.passes() {
        println!(
            "  pass {:<16} {:>4} draws",
            pass.label.as_deref().unwrap_or("<unnamed>"),
            pass.draw_count()
        );
    }
    println!("Pipelines built: {}", backend.pipeline_count());

    let (width, height) = (args.width as f32, args.height as f32);
    let mut camera = scene.main_camera.clone();
    camera.set_aspect(width / height.max(1.0));
    let ray = camera.screen_ray(Vec2::new(width * 0.5, height * 0.5), width, height);
    match scene.test_ray(&registry, &ray, u32::MAX, camera.far) {
        Some(hit) => {
            let albedo = registry
                .material_id("gray")
                .and_then(|id| registry.material(id))
                .map_or(Vec3::ONE, |m| m.base_color.truncate());
            let point = SurfacePoint::new(hit.hit.position, hit.hit.normal, albedo);
            let mut passes: Vec<_> = renderer
                .lights()
                .iter()
                .enumerate()
                .map(|(i, light)| {
                    let ambient = if i == 0 { scene.ambient_light } else { Vec3::ZERO };
                    light.gpu_data(ambient, if i == 0 { 1.0 } else { 0.0 })
                })
                .collect();
            if passes.is_empty() {
                passes.push(GpuLightData::ambient_only(scene.ambient_light));
            }
            let color = accumulate(&passes, &point);
            println!(
                "Centre pixel hits '{}' at {:.2} (distance {:.2}); expected colour ~{:.3}",
                scene.entities[hit.entity].name, hit.hit.position, hit.hit.distance, color
            );
        }
        None => println!("Centre pixel shows the background {:.3}", scene.background_color),
    }

    Ok(())
}
