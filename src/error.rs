use thiserror::Error;

use crate::shaders::{ProgramKind, ShaderStage};

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Every way an analysis run can end early.
///
/// None of these are retried: the run that hit one is aborted and no
/// classification is produced.
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    /// Texture, buffer or program object could not be allocated
    #[error("failed to create {resource}: {reason}")]
    ResourceCreation {
        resource: &'static str,
        reason: String,
    },

    /// A shader stage failed to compile
    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: ShaderStage, log: String },

    /// Stages compiled but the program could not be linked
    #[error("{program} program failed to link:\n{log}")]
    Link { program: ProgramKind, log: String },

    /// The external decoder could not produce pixels
    #[error("failed to decode {source_name}: {reason}")]
    Decode { source_name: String, reason: String },

    /// Framebuffer readback failed or was out of bounds
    #[error("failed to read back framebuffer: {reason}")]
    Readback { reason: String },

    /// A handle that this surface never issued, or already released
    #[error("unknown {0} handle")]
    UnknownHandle(&'static str),

    /// A run was advanced past a terminal state
    #[error("analysis run is already {0}")]
    InvalidState(&'static str),
}

impl AnalysisError {
    pub(crate) fn resource(resource: &'static str, reason: impl ToString) -> Self {
        Self::ResourceCreation {
            resource,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn readback(reason: impl ToString) -> Self {
        Self::Readback {
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_carries_log() {
        let err = AnalysisError::Compile {
            stage: ShaderStage::Fragment,
            log: "error: expected ';'".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("fragment"));
        assert!(message.contains("expected ';'"));
    }

    #[test]
    fn test_link_error_names_program() {
        let err = AnalysisError::Link {
            program: ProgramKind::Laplacian,
            log: "entry point missing".to_string(),
        };
        assert!(err.to_string().starts_with("laplacian program failed to link"));
    }
}
