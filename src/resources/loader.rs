//! Background asset decoding.
//!
//! Worker threads pull [`LoadRequest`]s from a shared job queue, decode
//! the file and push the result onto a bounded channel. The GPU thread
//! drains that channel with [`AssetLoader::poll`], one result per call,
//! so a burst of finished loads is spread over several frames.

use super::mesh_cache::{self, MeshCacheError};
use super::{Mesh, MeshId, ResourceRegistry, TextureData, TextureId};
use crate::config::LoaderConfig;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadRequest {
    /// Image file; registered under its file name
    Texture(PathBuf),
    /// Mesh cache file; registered under the mesh's stored name
    Mesh(PathBuf),
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to load mesh {path}: {source}")]
    Mesh {
        path: PathBuf,
        #[source]
        source: MeshCacheError,
    },
}

/// Asset registered by [`AssetLoader::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadedAsset {
    Texture(TextureId),
    Mesh(MeshId),
}

enum Decoded {
    Texture(TextureData),
    Mesh(Mesh),
}

impl LoadRequest {
    fn decode(self) -> Result<Decoded, LoadError> {
        match self {
            LoadRequest::Texture(path) => TextureData::from_file(&path)
                .map(Decoded::Texture)
                .map_err(|source| LoadError::Image { path, source }),
            LoadRequest::Mesh(path) => mesh_cache::load(&path)
                .map(Decoded::Mesh)
                .map_err(|source| LoadError::Mesh { path, source }),
        }
    }
}

type JobQueue = Arc<Mutex<Receiver<LoadRequest>>>;

pub struct AssetLoader {
    jobs: Option<Sender<LoadRequest>>,
    results: Option<Receiver<Result<Decoded, LoadError>>>,
    workers: Vec<JoinHandle<()>>,
    pending: usize,
}

impl AssetLoader {
    pub fn new(config: &LoaderConfig) -> Self {
        let (job_tx, job_rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::sync_channel(config.queue_capacity.max(1));
        let queue: JobQueue = Arc::new(Mutex::new(job_rx));

        let workers = (0..config.workers.max(1))
            .filter_map(|index| {
                let queue = Arc::clone(&queue);
                let results = result_tx.clone();
                std::thread::Builder::new()
                    .name(format!("asset-loader-{index}"))
                    .spawn(move || worker_loop(queue, results))
                    .map_err(|e| log::error!("Failed to spawn asset loader thread {index}: {e}"))
                    .ok()
            })
            .collect::<Vec<_>>();
        log::debug!("Asset loader started with {} workers", workers.len());

        Self {
            jobs: Some(job_tx),
            results: Some(result_rx),
            workers,
            pending: 0,
        }
    }

    /// Queue a file for decoding. Requests are served in FIFO order.
    pub fn request(&mut self, request: LoadRequest) {
        let Some(jobs) = &self.jobs else {
            return;
        };
        match jobs.send(request) {
            Ok(()) => self.pending += 1,
            Err(e) => log::error!("Asset loader is shut down, dropping {:?}", e.0),
        }
    }

    /// Requests not yet returned by [`AssetLoader::poll`]
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Register at most one finished load. `None` when nothing is ready.
    pub fn poll(&mut self, registry: &mut ResourceRegistry) -> Option<Result<LoadedAsset, LoadError>> {
        let result = match self.results.as_ref()?.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                log::error!("All asset loader workers have exited");
                return None;
            }
        };
        self.pending = self.pending.saturating_sub(1);

        Some(match result {
            Ok(Decoded::Texture(texture)) => {
                log::info!("Loaded texture {} ({}x{})", texture.name, texture.width, texture.height);
                Ok(LoadedAsset::Texture(registry.add_texture(texture)))
            }
            Ok(Decoded::Mesh(mesh)) => {
                log::info!("Loaded mesh {} ({} vertices)", mesh.name, mesh.vertex_count());
                Ok(LoadedAsset::Mesh(registry.add_mesh(mesh)))
            }
            Err(e) => {
                log::error!("{e}");
                Err(e)
            }
        })
    }
}

fn worker_loop(queue: JobQueue, results: SyncSender<Result<Decoded, LoadError>>) {
    loop {
        let request = queue.lock().recv();
        let Ok(request) = request else {
            break;
        };
        if results.send(request.decode()).is_err() {
            break;
        }
    }
}

impl Drop for AssetLoader {
    fn drop(&mut self) {
        // Closing both channels wakes workers blocked on either end
        self.jobs.take();
        self.results.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Asset loader thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("scene_renderer_loader_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_png(dir: &std::path::Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]))
            .save(&path)
            .unwrap();
        path
    }

    fn poll_until(loader: &mut AssetLoader, registry: &mut ResourceRegistry) -> Result<LoadedAsset, LoadError> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(result) = loader.poll(registry) {
                return result;
            }
            assert!(Instant::now() < deadline, "loader produced no result");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn each_poll_registers_one_asset() {
        let dir = temp_dir("each_poll");
        let mut loader = AssetLoader::new(&LoaderConfig { workers: 2, queue_capacity: 4 });
        let mut registry = ResourceRegistry::new();

        for name in ["a.png", "b.png", "c.png"] {
            loader.request(LoadRequest::Texture(write_png(&dir, name)));
        }
        assert_eq!(loader.pending(), 3);

        for expected in 1..=3 {
            let loaded = poll_until(&mut loader, &mut registry).unwrap();
            assert!(matches!(loaded, LoadedAsset::Texture(_)));
            assert_eq!(registry.texture_count(), expected);
        }
        assert_eq!(loader.pending(), 0);
        assert!(registry.texture_id("b.png").is_some());
    }

    #[test]
    fn meshes_and_failures_are_reported() {
        let dir = temp_dir("meshes_and_failures");
        let mesh_path = dir.join("cube.mesh");
        mesh_cache::save(&Mesh::cube(), &mesh_path).unwrap();

        let mut loader = AssetLoader::new(&LoaderConfig { workers: 1, queue_capacity: 1 });
        let mut registry = ResourceRegistry::new();
        loader.request(LoadRequest::Mesh(mesh_path));
        loader.request(LoadRequest::Texture(dir.join("missing.png")));

        assert!(matches!(poll_until(&mut loader, &mut registry), Ok(LoadedAsset::Mesh(_))));
        assert!(matches!(poll_until(&mut loader, &mut registry), Err(LoadError::Image { .. })));
        assert!(registry.mesh_id("cube").is_some());
    }
}
