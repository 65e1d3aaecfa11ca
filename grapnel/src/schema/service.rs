use super::TranscodeOptions;
use prost_reflect::{MethodDescriptor, ServiceDescriptor};

/// A resolved service: its descriptor plus the transcoding options of the
/// schema it came from.
#[derive(Debug, Clone)]
pub struct ServiceSchema {
    service: ServiceDescriptor,
    transcode: TranscodeOptions,
}

impl ServiceSchema {
    pub(crate) fn new(service: ServiceDescriptor, transcode: TranscodeOptions) -> Self {
        Self { service, transcode }
    }

    /// Simple name, e.g. `Echo`.
    pub fn name(&self) -> &str {
        self.service.name()
    }

    /// Fully qualified name, e.g. `echo.Echo`.
    pub fn full_name(&self) -> &str {
        self.service.full_name()
    }

    /// Looks up a method by simple name.
    pub fn method(&self, name: &str) -> Option<MethodDescriptor> {
        self.service.methods().find(|method| method.name() == name)
    }

    /// The simple names of every method the service declares.
    pub fn method_names(&self) -> Vec<String> {
        self.service
            .methods()
            .map(|method| method.name().to_string())
            .collect()
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.service
    }

    pub fn transcode(&self) -> TranscodeOptions {
        self.transcode
    }
}
