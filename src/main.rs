use tokio::signal;

use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use relief_map::app::{board_lines, create_app};
use relief_map::config::AppConfig;
use relief_map::state::SharedAppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenv().ok();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let config = AppConfig::from_env()?;
  let state = SharedAppState::new(&config).await?;

  let session = state.session.wait_until_loaded().await;
  match session.user() {
    Some(user) => tracing::info!(user_id = %user.id, "signed in"),
    None => tracing::info!("browsing signed out"),
  }

  let app = create_app(state).await;
  tracing::info!(live = app.is_live(), channel = %app.state.realtime_channel, "relief board running");

  let mut board = app.state.request_service.subscribe();
  let watch_board = async {
    loop {
      {
        let current = board.borrow_and_update();
        for line in board_lines(&current.requests, &app.state.volunteers) {
          tracing::info!("{}", line);
        }
      }
      if board.changed().await.is_err() {
        break;
      }
    }
  };

  tokio::select! {
      _ = watch_board => {},
      _ = shutdown_signal() => {},
  }

  app.shutdown();

  Ok(())
}

async fn shutdown_signal() {
  let ctrl_c = async {
    signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
  };

  #[cfg(unix)]
  let terminate = async {
    signal::unix::signal(signal::unix::SignalKind::terminate())
      .expect("Failed to install signal handler")
      .recv()
      .await;
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
      _ = ctrl_c => {},
      _ = terminate => {},
  }

  tracing::info!("Received termination signal, shutting down gracefully...");
}
