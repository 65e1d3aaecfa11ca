//! Runtime schema loading.
//!
//! `.proto` sources are compiled in-process with `protox`; any other file
//! extension is treated as a serialized `FileDescriptorSet`. Both paths end in
//! a `prost_reflect::DescriptorPool`, which backs all later lookups.
use super::{SchemaLoadOptions, ServiceSchema, TranscodeOptions};
use crate::BoxError;
use prost_reflect::DescriptorPool;
use std::path::{Path, PathBuf};

/// Errors that can occur while loading a schema from disk.
#[derive(Debug, thiserror::Error)]
pub enum SchemaLoadError {
    #[error("schema file '{}' not found", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read schema file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("schema failed to parse: {0}")]
    Parse(#[source] BoxError),
}

/// Errors that can occur while resolving a service within a loaded schema.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("namespace '{0}' not found in schema")]
    NamespaceNotFound(String),
    #[error("service '{service}' not found in namespace '{namespace}'")]
    ServiceNotFound { namespace: String, service: String },
}

/// A set of Protobuf definitions loaded at runtime, together with the
/// transcoding options they were loaded with.
///
/// Cloning is cheap; the underlying descriptor pool is reference counted.
#[derive(Debug, Clone)]
pub struct Schema {
    pool: DescriptorPool,
    transcode: TranscodeOptions,
}

impl Schema {
    /// Loads a schema from `path`.
    ///
    /// Files with a `.proto` extension are compiled from source, using
    /// `options.include_paths` plus the file's own directory as import roots.
    /// Any other extension is decoded as a binary `FileDescriptorSet`.
    pub fn load(path: impl AsRef<Path>, options: &SchemaLoadOptions) -> Result<Self, SchemaLoadError> {
        let path = path.as_ref();
        if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("proto"))
        {
            Self::compile_proto(path, options)
        } else {
            let bytes = std::fs::read(path).map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound => SchemaLoadError::NotFound(path.to_path_buf()),
                _ => SchemaLoadError::Io {
                    path: path.to_path_buf(),
                    source,
                },
            })?;
            Self::from_descriptor_set_bytes(&bytes, options)
        }
    }

    /// Builds a schema from an already serialized `FileDescriptorSet`.
    pub fn from_descriptor_set_bytes(
        bytes: &[u8],
        options: &SchemaLoadOptions,
    ) -> Result<Self, SchemaLoadError> {
        let pool =
            DescriptorPool::decode(bytes).map_err(|e| SchemaLoadError::Parse(Box::new(e)))?;
        Ok(Self {
            pool,
            transcode: options.transcode(),
        })
    }

    fn compile_proto(path: &Path, options: &SchemaLoadOptions) -> Result<Self, SchemaLoadError> {
        if !path.exists() {
            return Err(SchemaLoadError::NotFound(path.to_path_buf()));
        }

        // Explicit roots take priority for import resolution; the file's own
        // directory is the fallback so a self-contained schema needs none.
        let mut includes: Vec<&Path> = options.include_paths.iter().map(PathBuf::as_path).collect();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        includes.push(parent);

        let file_set =
            protox::compile([path], includes).map_err(|e| SchemaLoadError::Parse(Box::new(e)))?;
        let pool = DescriptorPool::from_file_descriptor_set(file_set)
            .map_err(|e| SchemaLoadError::Parse(Box::new(e)))?;

        Ok(Self {
            pool,
            transcode: options.transcode(),
        })
    }

    /// Resolves a service by namespace (Protobuf package) and simple name.
    ///
    /// An empty namespace addresses services declared without a package.
    pub fn resolve_service(
        &self,
        namespace: &str,
        service: &str,
    ) -> Result<ServiceSchema, ResolveError> {
        if !namespace.is_empty() && !self.namespace_exists(namespace) {
            return Err(ResolveError::NamespaceNotFound(namespace.to_string()));
        }

        let full_name = if namespace.is_empty() {
            service.to_string()
        } else {
            format!("{namespace}.{service}")
        };

        let descriptor =
            self.pool
                .get_service_by_name(&full_name)
                .ok_or_else(|| ResolveError::ServiceNotFound {
                    namespace: namespace.to_string(),
                    service: service.to_string(),
                })?;

        Ok(ServiceSchema::new(descriptor, self.transcode))
    }

    /// Fully qualified names of every service in the schema.
    pub fn services(&self) -> Vec<String> {
        self.pool
            .services()
            .map(|service| service.full_name().to_string())
            .collect()
    }

    /// The underlying descriptor pool.
    pub fn descriptor_pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// The transcoding options this schema was loaded with.
    pub fn transcode(&self) -> TranscodeOptions {
        self.transcode
    }

    // A namespace exists if some file declares it, or declares a package
    // nested beneath it.
    fn namespace_exists(&self, namespace: &str) -> bool {
        self.pool.files().any(|file| {
            let package = file.package_name();
            package == namespace
                || package
                    .strip_prefix(namespace)
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }
}
