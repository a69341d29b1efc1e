//! Testing utilities and mock implementations for E2E tests.
//!
//! [`MockPortal`] stands in for the web channel and [`MockDesktop`] for the
//! native window channel. The portal opens preview windows on the desktop it
//! was built with, so a whole acquisition runs without a browser or a
//! window system.
//!
//! # Example
//!
//! ```rust,ignore
//! use labelfetch_core::testing::{fixtures, LabelFixture, MockDesktop, MockPortal};
//!
//! let desktop = MockDesktop::new();
//! let portal = MockPortal::new(desktop.clone());
//! portal.add_record("UE4376", "123456789").await;
//! portal
//!     .set_labels("123456789", vec![LabelFixture::new(fixtures::label_text("NP6", "UE4376"))])
//!     .await;
//!
//! let orchestrator = fixtures::orchestrator(&portal, &desktop, output_dir.path());
//! ```

mod mock_desktop;
mod mock_portal;

pub use mock_desktop::{MockDesktop, RecordedInvocation, SaveBehavior};
pub use mock_portal::{LabelFixture, MockPortal};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;
    use std::sync::Arc;

    use super::{MockDesktop, MockPortal};
    use crate::desktop::{DesktopConfig, WindowController};
    use crate::navigator::{ProductionKeyConfig, ProductionKeyResolver};
    use crate::orchestrator::{AcquisitionOrchestrator, OrchestratorConfig, ShipmentItem};
    use crate::output::{OutputConfig, TripOutputPaths};
    use crate::polling::{StageBudget, StageBudgets};
    use crate::verifier::ContentVerifier;

    /// Rendered text of a compliant label for `item_key`/`lot_key`.
    pub fn label_text(item_key: &str, lot_key: &str) -> String {
        format!(
            "enLabel Global Services\nItem: {}   Lot: {}\nEPA Reg. No. 12345-6\n",
            item_key, lot_key
        )
    }

    /// A pending shipment item on trip `T-1`.
    pub fn item(item_key: &str, lot_key: &str) -> ShipmentItem {
        let mut item = ShipmentItem::new(item_key, lot_key);
        item.trip = "T-1".to_string();
        item.tracking_number = "1Z999".to_string();
        item
    }

    /// Budgets short enough for tests running on the real clock.
    pub fn fast_stages() -> StageBudgets {
        let quick = StageBudget::new(300, 5, 1);
        StageBudgets {
            page_ready: quick,
            element: quick,
            lookup: quick,
            search: quick,
            preview: StageBudget::new(200, 5, 0),
            render: quick,
            control: quick,
            target_selection: quick,
            save_dialog: StageBudget::new(200, 5, 0),
            file_appear: StageBudget::new(200, 5, 0),
            close: StageBudget::new(100, 5, 0),
        }
    }

    /// Controller over `desktop` with the default window patterns.
    pub fn controller(desktop: &MockDesktop, stages: StageBudgets) -> WindowController {
        WindowController::new(Arc::new(desktop.clone()), DesktopConfig::default(), stages)
    }

    /// Orchestrator wired to the mocks, writing under `output_root`.
    pub fn orchestrator(
        portal: &MockPortal,
        desktop: &MockDesktop,
        output_root: &Path,
    ) -> AcquisitionOrchestrator {
        orchestrator_with(portal, desktop, output_root, fast_stages())
    }

    pub fn orchestrator_with(
        portal: &MockPortal,
        desktop: &MockDesktop,
        output_root: &Path,
        stages: StageBudgets,
    ) -> AcquisitionOrchestrator {
        let output = OutputConfig {
            root: output_root.to_path_buf(),
            ..OutputConfig::default()
        };
        let resolver = ProductionKeyResolver::from_config(&ProductionKeyConfig::default())
            .expect("default production key pattern compiles");

        AcquisitionOrchestrator::new(
            OrchestratorConfig::default(),
            Arc::new(portal.clone()),
            Arc::new(controller(desktop, stages)),
            ContentVerifier::default(),
            resolver,
            Arc::new(TripOutputPaths::new(&output, "T-1")),
        )
    }
}
