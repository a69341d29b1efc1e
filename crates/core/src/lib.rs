pub mod bridge;
pub mod config;
pub mod desktop;
pub mod input;
pub mod ledger;
pub mod metrics;
pub mod navigator;
pub mod orchestrator;
pub mod output;
pub mod polling;
pub mod testing;
pub mod verifier;

pub use bridge::{PreviewBridge, PreviewError, PreviewToken};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LogFormat,
    SanitizedConfig,
};
pub use desktop::{native_backend, DesktopBackend, DesktopError, WindowController};
pub use input::{read_parsed_input, InputError, ParsedInputRow};
pub use ledger::{
    create_ledger_system, ErrorLedger, ErrorRecord, LedgerEvent, LedgerHandle, LedgerStore,
    SqliteLedgerStore, Stage,
};
pub use navigator::{
    CdpNavigator, CredentialProvider, Credentials, NavigatorError, ProductionKey,
    ProductionKeyResolver, Session, StaticCredentials, WebNavigator,
};
pub use orchestrator::{
    AcquisitionOrchestrator, AcquisitionResult, BatchReport, ItemOutcome, ItemStatus,
    OrchestratorConfig, OrchestratorError, ShipmentItem,
};
pub use output::{OutputConfig, OutputPathBuilder, TripOutputPaths, TripRoutedPaths};
pub use polling::{CancelFlag, StageBudget, StageBudgets};
pub use verifier::{ContentVerifier, VerificationReport, VerifierConfig};
