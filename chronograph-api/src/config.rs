//! Process configuration (§10.3). Every value the engine components need is
//! read here, once, and handed down explicitly -- the engine crates
//! themselves stay free of env-var coupling, the way the teacher's
//! `ServicesBuilder` takes `bind`/`port`/`prefix` as constructor arguments
//! rather than reaching into the environment from inside `tycho-indexer`'s
//! `services` module.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "chronograph-api", about = "Versioned knowledge-graph HTTP service")]
pub struct Config {
    /// Postgres DSN.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Address the HTTP server binds to.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// §6 "Environment/config": default page size for listing endpoints.
    #[arg(long, env = "DEFAULT_PAGE_LIMIT", default_value_t = 20)]
    pub default_page_limit: i64,

    /// §6: hard cap on the `limit` query parameter.
    #[arg(long, env = "MAX_PAGE_LIMIT", default_value_t = 200)]
    pub max_page_limit: i64,

    /// §6: `ivfflat.probes` raised for the duration of a vector-search
    /// transaction (§4.1 "Vector-recall tuning").
    #[arg(long, env = "VECTOR_PROBES", default_value_t = 10)]
    pub vector_probes: u32,

    /// §6: how long a cached template-schema lookup is considered fresh.
    /// Schema loading itself is out of scope (§1); this is carried so a
    /// future `SchemaProvider` implementation has a documented knob.
    #[arg(long, env = "SCHEMA_CACHE_TTL_SECS", default_value_t = 300)]
    pub schema_cache_ttl_secs: u64,

    /// §6: how long a cached inverse-type map is considered fresh.
    #[arg(long, env = "INVERSE_TYPE_CACHE_TTL_SECS", default_value_t = 300)]
    pub inverse_type_cache_ttl_secs: u64,

    /// §6 / §4.5 step 3: default and hard cap on merge preview size.
    #[arg(long, env = "MERGE_PREVIEW_LIMIT", default_value_t = 500)]
    pub merge_preview_limit: usize,
}

impl Config {
    /// Clamps a caller-supplied page limit into `(0, max_page_limit]`,
    /// substituting `default_page_limit` when the caller didn't ask for one.
    pub fn resolve_page_limit(&self, requested: Option<i64>) -> i64 {
        match requested {
            Some(limit) if limit > 0 => limit.min(self.max_page_limit),
            _ => self.default_page_limit,
        }
    }
}
