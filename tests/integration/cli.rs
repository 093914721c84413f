//! The `partcache` binary.

use crate::common::{BAD_URL, D7IH, MCMASTER_SCREW, TestProject};
use anyhow::Result;
use predicates::prelude::*;

const HARDWARE_CATALOG: &str = r#"
name = "hardware"
pattern = "^https?://www\\.mcmaster\\.com/"

[[parts]]
locator = "http://www.mcmaster.com/#91290A115"
identifier = "91290A115"
package_cost = 6.39
package_units = 100
project = "www.mcmaster.com"
"#;

const FIREPICK_CATALOG: &str = r#"
name = "firepick"
pattern = "^https://github\\.com/firepick1/FirePick/wiki/"

[[parts]]
locator = "https://github.com/firepick1/FirePick/wiki/D7IH"
identifier = "D7IH"
project = "FirePick"

[[parts.requires]]
locator = "https://github.com/firepick1/FirePick/wiki/DB16"
line_cost = 1.50

[[parts.requires]]
locator = "http://www.mcmaster.com/#91290A115"
quantity = 4
line_cost = 0.2556

[[parts]]
locator = "https://github.com/firepick1/FirePick/wiki/DB16"
identifier = "DB16"
package_cost = 1.50

[[parts]]
locator = "https://github.com/firepick1/FirePick/wiki/BROKEN"
identifier = "BROKEN"

[[parts.requires]]
locator = "https://github.com/firepick1/FirePick/wiki/MISSING"
line_cost = 1.0
"#;

fn project() -> Result<TestProject> {
    let project = TestProject::new()?;
    let hardware = project.write_catalog("hardware", HARDWARE_CATALOG)?;
    let firepick = project.write_catalog("firepick", FIREPICK_CATALOG)?;
    project.write_config("extraction_timeout_secs = 5", &[hardware, firepick])?;
    Ok(project)
}

#[test]
fn test_resolve_tree_as_json() -> Result<()> {
    let project = project()?;

    project
        .command()?
        .args(["--quiet", "resolve", D7IH, "--timeout", "10", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"identifier\": \"D7IH\""))
        .stdout(predicate::str::contains("\"identifier\": \"DB16\""))
        .stdout(predicate::str::contains("\"identifier\": \"91290A115\""))
        .stdout(predicate::str::contains("\"quantity\": 4"))
        .stdout(predicate::str::contains("\"resolved\": true"));
    Ok(())
}

#[test]
fn test_resolve_prints_tree() -> Result<()> {
    let project = project()?;

    project
        .command()?
        .args(["--quiet", "resolve", MCMASTER_SCREW, D7IH])
        .assert()
        .success()
        .stdout(predicate::str::contains("91290A115"))
        .stdout(predicate::str::contains("4 x 91290A115"))
        .stdout(predicate::str::contains("1 x DB16"));
    Ok(())
}

#[test]
fn test_failed_child_exits_nonzero() -> Result<()> {
    let project = project()?;

    project
        .command()?
        .args([
            "--quiet",
            "resolve",
            "https://github.com/firepick1/FirePick/wiki/BROKEN",
            "--json",
        ])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("not listed in catalog"))
        .stderr(predicate::str::contains("1 part(s) failed to resolve"));
    Ok(())
}

#[test]
fn test_unmatched_locator_exits_nonzero() -> Result<()> {
    let project = project()?;

    project
        .command()?
        .args(["--quiet", "resolve", BAD_URL])
        .assert()
        .failure()
        .stdout(predicate::str::contains("No extraction strategy matches"));
    Ok(())
}

#[test]
fn test_config_shows_effective_settings() -> Result<()> {
    let project = project()?;

    project
        .command()?
        .args(["--quiet", "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("extraction_timeout_secs = 5"))
        .stdout(predicate::str::contains("idle_timeout_secs = 3600"))
        .stdout(predicate::str::contains("hardware.toml"));
    Ok(())
}

#[test]
fn test_invalid_config_is_reported() -> Result<()> {
    let project = TestProject::new()?;
    project.write_config("refresh_interval_secs = 0", &[])?;

    project
        .command()?
        .args(["config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("refresh_interval_secs"));
    Ok(())
}

#[test]
fn test_missing_catalog_is_reported() -> Result<()> {
    let project = TestProject::new()?;
    project.write_config("", &[project.path().join("nope.toml")])?;

    project
        .command()?
        .args(["--quiet", "resolve", MCMASTER_SCREW])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.toml"));
    Ok(())
}
