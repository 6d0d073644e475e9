//! Concrete providers.
//!
//! The harness uses [`TerraformProvider`] and [`EnvProvider`] when no provider
//! is given explicitly. The others are opt-in.

mod env;
mod github;
mod kind;
mod kubectl;
mod terraform;

pub use env::{
    EnvProvider, CHATWORK_ROOM_ID_ENV, CHATWORK_TOKEN_ENV, GITHUB_REPO_ENV, TESTKIT_GITHUB_TOKEN_ENV, KUBECONFIG_ENV,
    S3_BUCKET_NAME_ENV, S3_BUCKET_PROFILE_ENV, S3_BUCKET_REGION_ENV, SLACK_APP_TOKEN_ENV, SLACK_BOT_TOKEN_ENV,
    SLACK_CHANNEL_ID_ENV, SLACK_INCOMING_WEBHOOK_URL_ENV,
};
pub use github::{GitHubWritableRepositoriesEnvProvider, CONFIG_BRANCH, GITHUB_WRITEABLE_REPOS_ENV, WRITABLE_MARKER};
pub use kind::KindProvider;
pub use kubectl::KubectlProvider;
pub use terraform::TerraformProvider;
