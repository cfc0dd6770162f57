mod settings;

pub use settings::{BridgeSettings, Config, LookupSettings, SessionSettings, Settings, WebSettings};
