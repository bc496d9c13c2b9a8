//! Acceptance test: `civibuild create` produces a website.
//!
//! Needs a working buildkit environment (civibuild on PATH or `CIVIBUILD_BIN`,
//! database and web server configured). Run with:
//!
//! ```text
//! CIVIBUILD_BUILD_ROOT=~/buildkit/build cargo test -p civibuild-check --test civibuild_create -- --ignored
//! ```

use civibuild_check::{init_tracing, CheckConfig, ProvisioningCheck, Verdict};
use tracing::Level;

#[tokio::test]
#[ignore = "requires a civibuild environment"]
async fn test_civibuild_create() {
    init_tracing(false, Level::INFO);

    let config = CheckConfig::from_env().expect("config from env");
    let check = ProvisioningCheck::from_config(config).expect("valid config");

    let report = check
        .run()
        .await
        .unwrap_or_else(|e| panic!("`{}` failed: {e}", check.invocation()));
    assert_eq!(report.verdict, Verdict::Pass);
    assert_eq!(report.result.exit_status, 0);
}
