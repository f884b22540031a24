use envconfig::Envconfig;

/// Process-level configuration, provided via environment variables
/// (spec.md §6 "Configuration", `store.address`/`logging.level` etc.,
/// translated to the flat env-var surface the reference codebase uses
/// for its own daemons). The richer nested document — agents, routes,
/// alert rules — lives in a separate TOML file pointed to by
/// `RULES_DOCUMENT_PATH`, since that structure doesn't fit flat env vars.
#[derive(Envconfig)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8080")]
    pub port: u16,

    #[envconfig(from = "REDIS_URL", default = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    #[envconfig(from = "RULES_DOCUMENT_PATH", default = "handoff-rules.toml")]
    pub rules_document_path: String,

    #[envconfig(from = "ARCHIVE_ROOT", default = "archive")]
    pub archive_root: String,

    #[envconfig(from = "INVOKER_COMMAND", default = "handoff-agent-invoker")]
    pub invoker_command: String,

    #[envconfig(from = "INVOKER_TIMEOUT_SECS", default = "60")]
    pub invoker_timeout_secs: u64,

    #[envconfig(from = "REDIS_OP_TIMEOUT_MS", default = "2000")]
    pub redis_op_timeout_ms: u64,
}
