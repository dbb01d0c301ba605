use wforce_domain::config::{Config, ConfigSeverity};

/// Runs diagnostic checks against `config` and prints a summary.
///
/// Returns `Ok(true)` when every check passes.
pub async fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("wforced doctor");
    println!("==============\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_config_validation(config, &mut all_passed);
    check_stats_dbs(config);
    check_lists_persistence(config).await;
    check_replication(config);
    check_webhooks(config, &mut all_passed);
    check_admin(config);

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

fn print_check(name: &str, ok: bool, detail: impl AsRef<str>) {
    let mark = if ok { "ok" } else { "FAIL" };
    println!("[{mark}] {name}: {}", detail.as_ref());
}

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists {
            config_path.to_owned()
        } else {
            format!("{config_path} not found (using defaults)")
        },
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    print_check(
        "Config validation",
        error_count == 0,
        format!("{} issue(s), {error_count} error(s)", issues.len()),
    );
    if error_count > 0 {
        *all_passed = false;
    }
}

fn check_stats_dbs(config: &Config) {
    print_check(
        "Stats DBs configured",
        !config.stats.dbs.is_empty(),
        format!("{} db(s)", config.stats.dbs.len()),
    );
}

async fn check_lists_persistence(config: &Config) {
    for (label, store) in [
        ("denylist", &config.lists.denylist),
        ("allowlist", &config.lists.allowlist),
    ] {
        match &store.persist {
            Some(p) => print_check(
                &format!("{label} persistence"),
                true,
                format!("{}:{} (persist_replicated={})", p.host, p.port, p.persist_replicated),
            ),
            None => print_check(&format!("{label} persistence"), true, "not configured"),
        }
    }
}

fn check_replication(config: &Config) {
    if !config.replication.enabled {
        print_check("Replication", true, "disabled");
        return;
    }
    print_check(
        "Replication",
        true,
        format!(
            "{} sibling(s), {} sibling thread(s)",
            config.replication.siblings.len(),
            config.replication.num_sibling_threads
        ),
    );
}

fn check_webhooks(config: &Config, all_passed: &mut bool) {
    let active = config.webhooks.hooks.iter().filter(|h| h.active).count();
    print_check(
        "Webhooks",
        true,
        format!("{active}/{} active hook(s)", config.webhooks.hooks.len()),
    );
    for hook in &config.webhooks.hooks {
        if let Err(e) = wforce_webhooks::validate_config(hook) {
            print_check(&format!("Webhook {} config", hook.id), false, e);
            *all_passed = false;
        }
    }
}

fn check_admin(config: &Config) {
    if !config.admin.enabled {
        print_check("Control channel", true, "disabled");
        return;
    }
    print_check(
        "Control channel",
        config.admin.key.is_some(),
        if config.admin.key.is_some() {
            format!("enabled on {}", config.admin.listen)
        } else {
            "enabled with no key configured".to_string()
        },
    );
}
