use intellimark_backend::{
    config::{get_config, init_config},
    database::pool::{create_pool, run_migrations},
    routes, AppState,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("intellimark_backend=info,tower_http=info"));
    let json = std::env::var("LOG_FORMAT").map_or(false, |v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    run_migrations(&pool).await?;

    let app_state = AppState::new(pool);

    if let (Some(email), Some(password)) = (
        config.super_admin_email.as_deref(),
        config.super_admin_password.as_deref(),
    ) {
        match app_state.auth_service.bootstrap_admin(email, password).await {
            Ok(true) => info!(email, "Created super admin account"),
            Ok(false) => info!(email, "Super admin account already present"),
            Err(e) => tracing::error!(error = ?e, "Failed to bootstrap super admin"),
        }
    }

    {
        let auth = app_state.auth_service.clone();
        tokio::spawn(async move {
            loop {
                match auth.purge_expired().await {
                    Ok((revoked, verifications)) if revoked + verifications > 0 => {
                        info!(revoked, verifications, "Purged expired auth records");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = ?e, "Auth cleanup error"),
                }
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        });
    }

    let app = routes::router(app_state);

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
