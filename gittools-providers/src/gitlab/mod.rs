//! GitLab token validation.

mod validator;

pub use validator::{GitLabValidator, GITLAB_API_BASE};
