//! Command line and environment configuration.

use clap::{Args, Parser, Subcommand};
use shelf_hub_core::limits::{
    Limits, DEFAULT_SEARCH_LIMIT, MAX_BATCH_CREATE_BLOCK_SIZE, MAX_BATCH_SIZE, MAX_SEARCH_LIMIT,
    MAX_SUB_SHELVES_OF_ROOT_SHELF, MAX_WORKERS,
};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "shelf-hub")]
#[command(about = "Hierarchical shelves of block documents over HTTP")]
pub struct Cli {
    /// SQLite database file
    #[arg(long, env = "SHELF_HUB_DATABASE", default_value = "shelf-hub.db", global = true)]
    pub database: PathBuf,

    /// Default tracing filter when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve(ServeArgs),

    /// Manage users
    User {
        #[command(subcommand)]
        action: UserCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// Insert a user row and print its id
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        display_name: Option<String>,

        #[arg(long)]
        email: String,
    },
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Listen address
    #[arg(long, env = "SHELF_HUB_LISTEN", default_value = "127.0.0.1:3000")]
    pub listen: SocketAddr,

    /// HS256 secret used to verify access tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Allow any origin
    #[arg(long, env = "SHELF_HUB_PERMISSIVE_CORS")]
    pub permissive_cors: bool,

    #[command(flatten)]
    pub limits: LimitArgs,
}

#[derive(Debug, Clone, Args)]
pub struct LimitArgs {
    #[arg(long, env = "SHELF_HUB_DEFAULT_SEARCH_LIMIT", default_value_t = DEFAULT_SEARCH_LIMIT)]
    pub default_search_limit: usize,

    #[arg(long, env = "SHELF_HUB_MAX_SEARCH_LIMIT", default_value_t = MAX_SEARCH_LIMIT)]
    pub max_search_limit: usize,

    #[arg(long, env = "SHELF_HUB_MAX_BATCH_SIZE", default_value_t = MAX_BATCH_SIZE)]
    pub max_batch_size: usize,

    #[arg(long, env = "SHELF_HUB_MAX_BATCH_CREATE_BLOCK_SIZE", default_value_t = MAX_BATCH_CREATE_BLOCK_SIZE)]
    pub max_batch_create_block_size: usize,

    /// Blocking workers used to validate block trees
    #[arg(long, env = "SHELF_HUB_MAX_WORKERS", default_value_t = MAX_WORKERS)]
    pub max_workers: usize,

    #[arg(long, env = "SHELF_HUB_MAX_SUB_SHELF_DEPTH", default_value_t = MAX_SUB_SHELVES_OF_ROOT_SHELF)]
    pub max_sub_shelf_depth: usize,
}

impl LimitArgs {
    pub fn to_limits(&self) -> Limits {
        Limits {
            default_search_limit: self.default_search_limit,
            max_search_limit: self.max_search_limit.max(1),
            max_batch_size: self.max_batch_size.max(1),
            max_batch_create_block_size: self.max_batch_create_block_size.max(1),
            max_workers: self.max_workers.max(1),
            max_sub_shelves_of_root_shelf: self.max_sub_shelf_depth,
            ..Limits::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults_match_core_limits() {
        let cli = Cli::try_parse_from(["shelf-hub", "serve", "--jwt-secret", "s"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.listen.port(), 3000);
        assert_eq!(args.limits.to_limits(), Limits::default());
    }

    #[test]
    fn limits_are_overridable() {
        let cli = Cli::try_parse_from([
            "shelf-hub",
            "--database",
            "/tmp/x.db",
            "serve",
            "--jwt-secret",
            "s",
            "--max-batch-size",
            "4",
            "--max-workers",
            "0",
        ])
        .unwrap();
        assert_eq!(cli.database, PathBuf::from("/tmp/x.db"));
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let limits = args.limits.to_limits();
        assert_eq!(limits.max_batch_size, 4);
        assert_eq!(limits.max_workers, 1);
    }

    #[test]
    fn user_create_parses() {
        let cli = Cli::try_parse_from([
            "shelf-hub", "user", "create", "--name", "ada", "--email", "ada@example.com",
        ])
        .unwrap();
        match cli.command {
            Command::User {
                action: UserCommand::Create { name, display_name, email },
            } => {
                assert_eq!(name, "ada");
                assert_eq!(display_name, None);
                assert_eq!(email, "ada@example.com");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
