//! Mesh download descriptors and the blocking fetch pool.
//!
//! The HTTP client lives outside this crate behind [`MeshFetcher`]. Each
//! fetch is blocking I/O, so [`fetch_all`] moves it onto tokio's blocking
//! pool and bounds the number in flight with a semaphore.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use cadlink_ir::{DocumentRef, Part};
use cadlink_math::Transform;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Kind of workspace a mesh is downloaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkspaceType {
    /// Mutable workspace.
    #[serde(rename = "w")]
    Workspace,
    /// Immutable version.
    #[serde(rename = "v")]
    Version,
}

impl WorkspaceType {
    /// Path segment used by the CAD service.
    pub fn as_str(self) -> &'static str {
        match self {
            WorkspaceType::Workspace => "w",
            WorkspaceType::Version => "v",
        }
    }
}

/// What to download for a body and how to re-express it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadDescriptor {
    /// Document holding the part.
    pub document_id: String,
    /// Workspace or version.
    pub workspace_type: WorkspaceType,
    /// Workspace or version id.
    pub workspace_id: String,
    /// Element id.
    pub element_id: String,
    /// Part id inside the element.
    pub part_id: String,
    /// Download the whole element as an assembly.
    pub is_rigid_assembly: bool,
    /// Maps mesh vertices into the body frame.
    pub mesh_to_body: Transform,
    /// Target file, `<body>.stl`.
    pub file_name: String,
}

impl DownloadDescriptor {
    /// Descriptor for a part drawn as body `body_name`.
    ///
    /// A part pinned to a document version downloads from that version;
    /// otherwise from its rigid-assembly workspace or the assembly's own.
    pub fn for_part(
        part: &Part,
        document: &DocumentRef,
        body_name: &str,
        mesh_to_body: Transform,
    ) -> Self {
        let (workspace_type, workspace_id) = match &part.document_version {
            Some(version) => (WorkspaceType::Version, version.clone()),
            None => (
                WorkspaceType::Workspace,
                part.rigid_assembly_workspace_id
                    .clone()
                    .unwrap_or_else(|| document.workspace_id.clone()),
            ),
        };
        Self {
            document_id: part.document_id.clone(),
            workspace_type,
            workspace_id,
            element_id: part.element_id.clone(),
            part_id: part.part_id.clone(),
            is_rigid_assembly: part.is_rigid_assembly,
            mesh_to_body,
            file_name: format!("{body_name}.stl"),
        }
    }

    /// Request path on the CAD service.
    pub fn request_path(&self) -> String {
        let base = format!(
            "d/{}/{}/{}/e/{}",
            self.document_id,
            self.workspace_type.as_str(),
            self.workspace_id,
            self.element_id
        );
        if self.is_rigid_assembly {
            format!("/api/assemblies/{base}/translations")
        } else {
            format!("/api/parts/{base}/partid/{}/stl", self.part_id)
        }
    }
}

/// Errors from a mesh fetch.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport failed.
    #[error("download failed for {file}: {reason}")]
    Download {
        /// Target file.
        file: String,
        /// Why.
        reason: String,
    },

    /// IO error while writing the mesh.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking task panicked or was cancelled.
    #[error("fetch task failed: {0}")]
    Task(String),
}

/// Blocking mesh downloader.
pub trait MeshFetcher: Send + Sync + 'static {
    /// Download and write one mesh; returns the written path.
    fn fetch(&self, asset: &DownloadDescriptor) -> Result<PathBuf, FetchError>;
}

/// Fetch every asset with at most `max_parallel` downloads in flight.
///
/// Failures are collected per body; one failed mesh does not stop the rest.
pub async fn fetch_all<F: MeshFetcher>(
    fetcher: Arc<F>,
    assets: &BTreeMap<String, DownloadDescriptor>,
    max_parallel: usize,
) -> BTreeMap<String, Result<PathBuf, FetchError>> {
    let permits = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut tasks = JoinSet::new();

    for (body, asset) in assets {
        let fetcher = Arc::clone(&fetcher);
        let permits = Arc::clone(&permits);
        let body = body.clone();
        let asset = asset.clone();
        tasks.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(permit) => {
                    tracing::info!("Starting download for {}", asset.file_name);
                    let joined = tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        fetcher.fetch(&asset)
                    })
                    .await;
                    joined.unwrap_or_else(|e| Err(FetchError::Task(e.to_string())))
                }
                Err(e) => Err(FetchError::Task(e.to_string())),
            };
            (body, result)
        });
    }

    let mut results = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((body, result)) => {
                if let Err(e) = &result {
                    tracing::error!("Failed to download mesh for {}: {}", body, e);
                }
                results.insert(body, result);
            }
            Err(e) => tracing::error!("Download task failed: {}", e),
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadlink_ir::MassProperties;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const DOC: &str = "a1c1addf75444f54b504f25c";
    const WS: &str = "c842455c29cc878dc48bdc68";

    fn part() -> Part {
        Part {
            name: "p".to_string(),
            document_id: DOC.to_string(),
            element_id: "0b0c209535554345432581fe".to_string(),
            part_id: "JHD".to_string(),
            configuration: "default".to_string(),
            document_version: None,
            rigid_assembly_workspace_id: None,
            mass_properties: MassProperties {
                mass: 1.0,
                center_of_mass: [0.0; 3],
                inertia: [[0.0; 3]; 3],
            },
            is_rigid_assembly: false,
            is_fixed: false,
            placement: None,
        }
    }

    fn document() -> DocumentRef {
        DocumentRef {
            document_id: DOC.to_string(),
            workspace_id: WS.to_string(),
        }
    }

    #[test]
    fn test_descriptor_uses_document_workspace() {
        let d = DownloadDescriptor::for_part(&part(), &document(), "base", Transform::identity());
        assert_eq!(d.workspace_type, WorkspaceType::Workspace);
        assert_eq!(d.workspace_id, WS);
        assert_eq!(d.file_name, "base.stl");
        assert_eq!(
            d.request_path(),
            format!("/api/parts/d/{DOC}/w/{WS}/e/0b0c209535554345432581fe/partid/JHD/stl")
        );
    }

    #[test]
    fn test_descriptor_prefers_version_then_rigid_workspace() {
        let mut p = part();
        p.rigid_assembly_workspace_id = Some("0d17b8ebb2a4c76be9fff3c7".to_string());
        let d = DownloadDescriptor::for_part(&p, &document(), "sub", Transform::identity());
        assert_eq!(d.workspace_type, WorkspaceType::Workspace);
        assert_eq!(d.workspace_id, "0d17b8ebb2a4c76be9fff3c7");

        p.document_version = Some("1f42f849180e6e5c9abfce52".to_string());
        p.is_rigid_assembly = true;
        let d = DownloadDescriptor::for_part(&p, &document(), "sub", Transform::identity());
        assert_eq!(d.workspace_type, WorkspaceType::Version);
        assert_eq!(d.workspace_id, "1f42f849180e6e5c9abfce52");
        assert!(d.request_path().ends_with("/translations"));
    }

    #[test]
    fn test_workspace_type_serializes_as_letter() {
        assert_eq!(serde_json::to_string(&WorkspaceType::Version).unwrap(), "\"v\"");
    }

    struct CountingFetcher {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl MeshFetcher for CountingFetcher {
        fn fetch(&self, asset: &DownloadDescriptor) -> Result<PathBuf, FetchError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            self.active.fetch_sub(1, Ordering::SeqCst);
            if asset.file_name.starts_with("bad") {
                return Err(FetchError::Download {
                    file: asset.file_name.clone(),
                    reason: "HTTP 404".to_string(),
                });
            }
            Ok(PathBuf::from(&asset.file_name))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fetch_all_bounds_parallelism_and_collects_failures() {
        let fetcher = Arc::new(CountingFetcher {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let assets: BTreeMap<String, DownloadDescriptor> = ["a", "b", "bad", "c", "d", "e"]
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    DownloadDescriptor::for_part(&part(), &document(), name, Transform::identity()),
                )
            })
            .collect();

        let results = fetch_all(Arc::clone(&fetcher), &assets, 2).await;
        assert_eq!(results.len(), 6);
        assert!(matches!(results["bad"], Err(FetchError::Download { .. })));
        assert_eq!(results["a"].as_ref().unwrap(), &PathBuf::from("a.stl"));
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 2);
    }
}
