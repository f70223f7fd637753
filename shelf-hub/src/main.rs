use anyhow::Context;
use axum::serve;
use clap::Parser;
use shelf_hub::api::{self, AppState};
use shelf_hub::config::{Cli, Command, ServeArgs, UserCommand};
use shelf_hub_core::{
    auth::Hs256Verifier,
    clock::SystemClock,
    store::{Db, NewUser},
    Limits, ShelfService,
};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_service(database: &Path, limits: Limits) -> anyhow::Result<ShelfService> {
    let db = Db::open(database)
        .with_context(|| format!("opening database {}", database.display()))?;
    Ok(ShelfService::new(
        Arc::new(db),
        Arc::new(limits),
        Arc::new(SystemClock),
    ))
}

async fn serve_http(database: &Path, args: ServeArgs) -> anyhow::Result<()> {
    let service = open_service(database, args.limits.to_limits())?;
    let state = AppState {
        service,
        verifier: Arc::new(Hs256Verifier::new(args.jwt_secret)),
    };
    let app = api::router(state, args.permissive_cors);

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!(addr = %args.listen, "listening");
    serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    match cli.command {
        Command::Serve(args) => serve_http(&cli.database, args).await?,
        Command::User {
            action: UserCommand::Create { name, display_name, email },
        } => {
            let service = open_service(&cli.database, Limits::default())?;
            let user = service
                .create_user(&NewUser {
                    display_name: display_name.unwrap_or_else(|| name.clone()),
                    name,
                    email,
                    ..Default::default()
                })
                .await?;
            println!("{}", user.id);
        }
    }
    Ok(())
}
