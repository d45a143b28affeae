//! File-backed cluster: one YAML file per object.
//!
//! Layout: `<root>/<group|core>/<version>/<Kind>/<namespace>/<name>.yaml`.
//! Cluster-scoped objects use `_cluster` as their namespace directory.
//! Used by `stackhook run` to drive the controller against a directory tree.

use async_trait::async_trait;
use stackhook_core::cluster::prepare_for_create;
use stackhook_core::{Cluster, Error, Instance, ObjectKey, Result, TypeIdentity};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const CORE_GROUP_DIR: &str = "core";
const CLUSTER_SCOPE_DIR: &str = "_cluster";
const EXTENSION: &str = "yaml";

pub struct LocalCluster {
    root: PathBuf,
}

impl LocalCluster {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn object_path(&self, type_id: &TypeIdentity, key: &ObjectKey) -> PathBuf {
        let namespace = if key.namespace.is_empty() {
            CLUSTER_SCOPE_DIR
        } else {
            key.namespace.as_str()
        };
        type_dir(&self.root, type_id)
            .join(namespace)
            .join(format!("{}.{}", key.name, EXTENSION))
    }

    /// Write an object, replacing any existing file. Server metadata is filled when missing.
    pub async fn put(&self, object: Instance) -> Result<Instance> {
        let object = prepare_for_create(object)?;
        let path = self.object_path(&object.type_identity()?, &object.key());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_yaml::to_string(&object)?).await?;
        Ok(object)
    }
}

/// Directory holding every object of one type.
pub fn type_dir(root: &Path, type_id: &TypeIdentity) -> PathBuf {
    let group = if type_id.group.is_empty() {
        CORE_GROUP_DIR
    } else {
        type_id.group.as_str()
    };
    root.join(group).join(&type_id.version).join(&type_id.kind)
}

/// Object key for a file under [`type_dir`], if it is an object file.
pub fn key_for_path(type_root: &Path, path: &Path) -> Option<ObjectKey> {
    if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
        return None;
    }
    let relative = path.strip_prefix(type_root).ok()?;
    let mut parts = relative.iter();
    let namespace = parts.next()?.to_str()?;
    let file = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let name = Path::new(file).file_stem()?.to_str()?;
    let namespace = if namespace == CLUSTER_SCOPE_DIR { "" } else { namespace };
    Some(ObjectKey::new(namespace, name))
}

/// Write `content` to `path` only if nothing is there yet.
///
/// The content lands in a temp file beside `path` and is renamed into place
/// without replacing. A failed write never leaves a file at `path`.
fn write_new(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(content)?;
    staged.as_file().sync_all()?;
    staged.persist_noclobber(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl Cluster for LocalCluster {
    async fn get(&self, type_id: &TypeIdentity, key: &ObjectKey) -> Result<Instance> {
        let path = self.object_path(type_id, key);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Instance::from_yaml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("{} {}", type_id, key)))
            }
            Err(e) => Err(Error::Cluster(format!("read {}: {}", path.display(), e))),
        }
    }

    async fn create(&self, object: Instance) -> Result<Instance> {
        let object = prepare_for_create(object)?;
        let type_id = object.type_identity()?;
        let path = self.object_path(&type_id, &object.key());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_yaml::to_string(&object)?;
        let target = path.clone();
        let bytes = content.len();
        let written = tokio::task::spawn_blocking(move || write_new(&target, content.as_bytes()))
            .await
            .map_err(|e| Error::Cluster(format!("create {}: {}", path.display(), e)))?;
        match written {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::AlreadyExists(format!("{} {}", type_id, object.key())));
            }
            Err(e) => return Err(Error::Cluster(format!("create {}: {}", path.display(), e))),
        }
        debug!("wrote {} ({} bytes)", path.display(), bytes);
        Ok(object)
    }

    async fn list(&self, type_id: &TypeIdentity) -> Result<Vec<Instance>> {
        let dir = type_dir(&self.root, type_id);
        let paths: Vec<PathBuf> = WalkDir::new(&dir)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| key_for_path(&dir, p).is_some())
            .collect();

        let mut objects = Vec::with_capacity(paths.len());
        for path in paths {
            let content = tokio::fs::read_to_string(&path).await?;
            objects.push(Instance::from_yaml(&content)?);
        }
        objects.sort_by_key(|o| o.key());
        Ok(objects)
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}
