use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use contact_gateway::web::WebServer;
use contact_gateway_core::config::{Config, Settings};
use contact_gateway_core::connection::{BridgeConnection, ContactConnection};
use contact_gateway_core::lookup::RequestGateway;
use contact_gateway_core::session::{CredentialStore, Session, SessionController};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Load settings (file < PORT env < CLI)
    let mut settings = Settings::load(cli.config.as_ref())?;
    settings.merge_env();
    settings.merge_cli(&cli);
    settings.validate();

    let store = CredentialStore::from_settings(&settings.session);
    if store.exists() {
        tracing::info!("Restoring saved session from {}", store.session_dir().display());
    } else {
        tracing::info!("No saved session, a QR code will be issued");
    }

    let session = Session::shared(store.root().to_path_buf());
    let connection: Arc<dyn ContactConnection> =
        Arc::new(BridgeConnection::new(&settings.bridge, &store));

    let controller = Arc::new(SessionController::new(
        session.clone(),
        store,
        connection.clone(),
        settings.status_url(),
    ));
    let _events = controller.clone().start();

    let gateway = Arc::new(RequestGateway::new(
        session,
        connection,
        settings.lookup.default_country.clone(),
    ));

    // Start the client only once the listener is bound
    WebServer::new(settings.web.clone(), gateway)
        .run(move || {
            let _init = controller.initialize_connection();
        })
        .await
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("contact_gateway=debug,contact_gateway_core=debug")
    } else {
        EnvFilter::new("contact_gateway=info,contact_gateway_core=info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
