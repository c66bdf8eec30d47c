//! Domain models for `QuotaWatch`.
//!
//! ## Submodules
//!
//! - [`credentials`] - Discovery output (`ProcessCandidate`, `CredentialBundle`)
//! - [`quota`] - Quota data (`QuotaSnapshot`, `ModelQuotaInfo`, `PromptCreditsInfo`)
//! - [`status`] - Polling enums (`QuotaApiMethod`, `PollStatus`)

pub mod credentials;
pub mod quota;
pub mod status;

pub use credentials::{CredentialBundle, ProcessCandidate};
pub use quota::{ModelQuotaInfo, PaceStatus, PromptCreditsInfo, QuotaLevel, QuotaSnapshot};
pub use status::{PollStatus, QuotaApiMethod};
