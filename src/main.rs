use hirechat::{
    app, auth::revocation, config::Config, db,
    mail::{self, LogTransport, Outbox, RetryPolicy},
    AppState,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,hirechat=debug")),
        )
        .init();

    let config = Config::from_env()?;
    info!(database = %config.database_url, listen = %config.listen_addr, "starting hirechat");

    let db_pool = db::connect(&config.database_url).await?;
    db::migrate(&db_pool).await?;

    let (outbox, mail_rx) = Outbox::channel(256);
    let retry = RetryPolicy { max_attempts: config.mail_max_attempts, ..RetryPolicy::default() };
    tokio::spawn(mail::run_mailer(mail_rx, LogTransport, retry, outbox.stats()));

    tokio::spawn(revocation::run_sweeper(db_pool.clone(), config.revoked_sweep_interval));

    let listen_addr = config.listen_addr;
    let poll = config.deletion_poll_interval;
    let app_state = AppState::new(db_pool, config, outbox);
    tokio::spawn(app_state.chat.scheduler().clone().run(poll));

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!(addr = %listen_addr, "listening");
    axum::serve(listener, app(app_state)).await?;

    Ok(())
}
