//! Process-level configuration, environment-variable-backed, in the same
//! shape as the runtime's tiered endpoint config: one struct, one
//! `Default` impl, each field documenting the env var and fallback it reads.

use std::path::PathBuf;

use geminiloop_runtime::state::OpenHandsMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodegenBackend {
    Mock,
    Local,
}

#[derive(Debug, Clone)]
pub struct LlmEndpoint {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// GOOGLE_AI_STUDIO_API_KEY — shared by planner, generator, and evaluator.
    pub planner: LlmEndpoint,
    pub evaluator: LlmEndpoint,

    /// WORKSPACE_ROOT / PROJECT_DIR_NAME — resolved by `PathConfig`, not
    /// duplicated here; see `geminiloop_runtime::path`.
    pub workspace_root: Option<PathBuf>,
    pub project_dir_name: String,

    /// PREVIEW_HOST / PREVIEW_PORT
    pub preview_host: String,
    pub preview_port: u16,

    /// TEMPLATE_REPO_URL / TEMPLATE_REF / RUN_TEMPLATE_INIT / PUBLISH_TO_SITE
    pub template_repo_url: Option<String>,
    pub template_ref: String,
    pub run_template_init: bool,
    pub publish_to_site: bool,

    /// OPENHANDS_MODE — selects the scripted vs. delegated C8 backend.
    pub openhands_mode: OpenHandsMode,
    /// OPENHANDS_TIMEOUT_SECONDS — delegated-mode wall clock (default 600).
    pub openhands_timeout_seconds: u64,

    /// AGENTIC_MAX_STEPS — per-iteration exploration step cap.
    pub agentic_max_steps: u32,

    /// Upper bound the spec fixes regardless of request input: 2.
    pub max_iterations_ceiling: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let openhands_mode = match std::env::var("OPENHANDS_MODE").as_deref() {
            Ok("local") => OpenHandsMode::Local,
            _ => OpenHandsMode::Mock,
        };

        Self {
            planner: LlmEndpoint {
                api_key: std::env::var("GOOGLE_AI_STUDIO_API_KEY").unwrap_or_default(),
                model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".into()),
            },
            evaluator: LlmEndpoint {
                api_key: std::env::var("GOOGLE_AI_STUDIO_API_KEY").unwrap_or_default(),
                model: std::env::var("EVALUATOR_MODEL")
                    .unwrap_or_else(|_| "gemini-2.0-flash".into()),
            },
            workspace_root: std::env::var("WORKSPACE_ROOT").ok().map(PathBuf::from),
            project_dir_name: std::env::var("PROJECT_DIR_NAME").unwrap_or_else(|_| "project".into()),
            preview_host: std::env::var("PREVIEW_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            preview_port: std::env::var("PREVIEW_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            template_repo_url: std::env::var("TEMPLATE_REPO_URL").ok(),
            template_ref: std::env::var("TEMPLATE_REF").unwrap_or_else(|_| "main".into()),
            run_template_init: std::env::var("RUN_TEMPLATE_INIT")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            publish_to_site: std::env::var("PUBLISH_TO_SITE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            openhands_mode,
            openhands_timeout_seconds: std::env::var("OPENHANDS_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(600),
            agentic_max_steps: std::env::var("AGENTIC_MAX_STEPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(15),
            max_iterations_ceiling: 2,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Clamp a request-supplied `max_iterations` into `[1, ceiling]`.
    pub fn clamp_max_iterations(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.max_iterations_ceiling)
            .clamp(1, self.max_iterations_ceiling)
    }

    /// A config fixed for tests: no API key (so any live LLM call fails
    /// fast rather than hanging), scripted/mock codegen, a short agentic
    /// step cap, and no template bootstrap — so a test only depends on
    /// `base_dir`, never on the environment.
    pub fn for_tests() -> Self {
        Self {
            planner: LlmEndpoint {
                api_key: String::new(),
                model: "gemini-2.0-flash".into(),
            },
            evaluator: LlmEndpoint {
                api_key: String::new(),
                model: "gemini-2.0-flash".into(),
            },
            workspace_root: None,
            project_dir_name: "project".into(),
            preview_host: "127.0.0.1".into(),
            preview_port: 0,
            template_repo_url: None,
            template_ref: "main".into(),
            run_template_init: false,
            publish_to_site: false,
            openhands_mode: OpenHandsMode::Mock,
            openhands_timeout_seconds: 5,
            agentic_max_steps: 2,
            max_iterations_ceiling: 2,
        }
    }
}
