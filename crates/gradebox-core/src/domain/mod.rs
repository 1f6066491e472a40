//! Domain types shared by the submission lifecycle.

pub mod build_spec;
pub mod message;
pub mod profile;
pub mod session;

pub use build_spec::{
    BuildImage, BuildSpecification, Commands, CpuResources, GpuResources, PushCredentials,
    PushSpec, Resources, RuntimeSpec,
};
pub use message::{header_keys, JobRequest, JobResponse, QueueMessage, ResponseKind};
pub use profile::{DockerHubCredentials, Profile, ProfileFile, User};
pub use session::SessionId;
