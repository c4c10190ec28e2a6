use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tasktree::core::config::ConfigLoader;
use tempfile::TempDir;

fn clear_tasktree_env() {
    for name in [
        "TASKTREE_WHILE_ITERATION_CAP",
        "TASKTREE_DEFAULT_CWD",
        "TASKTREE_LOG_PARAMS",
    ] {
        env::remove_var(name);
    }
}

#[test]
#[serial]
fn test_defaults_without_config_file() {
    clear_tasktree_env();
    let workspace = TempDir::new().unwrap();
    let config = ConfigLoader::load_from_workspace(workspace.path()).unwrap();
    assert_eq!(config.while_iteration_cap, 10_000);
    assert!(config.default_cwd.is_none());
    assert!(!config.log_params);
}

#[test]
#[serial]
fn test_config_file_and_env_layering() {
    clear_tasktree_env();
    let workspace = TempDir::new().unwrap();
    fs::write(
        workspace.path().join("tasktree.toml"),
        "while_iteration_cap = 50\ndefault_cwd = \"/srv/lab\"\n",
    )
    .unwrap();

    let config = ConfigLoader::load_from_workspace(workspace.path()).unwrap();
    assert_eq!(config.while_iteration_cap, 50);
    assert_eq!(config.default_cwd, Some(PathBuf::from("/srv/lab")));

    env::set_var("TASKTREE_WHILE_ITERATION_CAP", "9");
    env::set_var("TASKTREE_LOG_PARAMS", "true");
    let config = ConfigLoader::load_from_workspace(workspace.path()).unwrap();
    clear_tasktree_env();

    assert_eq!(config.while_iteration_cap, 9);
    assert!(config.log_params);
    assert_eq!(config.default_cwd, Some(PathBuf::from("/srv/lab")));
}

#[test]
#[serial]
fn test_invalid_values_are_rejected() {
    clear_tasktree_env();
    let workspace = TempDir::new().unwrap();
    fs::write(
        workspace.path().join("tasktree.toml"),
        "while_iteration_cap = 0\n",
    )
    .unwrap();
    assert!(ConfigLoader::load_from_workspace(workspace.path()).is_err());

    fs::write(workspace.path().join("tasktree.toml"), "while_iteration_cap = [").unwrap();
    let err = ConfigLoader::load_from_workspace(workspace.path()).unwrap_err();
    assert_eq!(err.code, "TT-CFG-001");

    fs::remove_file(workspace.path().join("tasktree.toml")).unwrap();
    env::set_var("TASKTREE_WHILE_ITERATION_CAP", "lots");
    let result = ConfigLoader::load_from_workspace(workspace.path());
    clear_tasktree_env();
    assert!(result.is_err());
}

#[test]
fn test_env_documentation_lists_overrides() {
    let docs = ConfigLoader::env_var_documentation();
    assert!(docs.iter().any(|line| line.starts_with("TASKTREE_WHILE_ITERATION_CAP")));
    assert!(docs.iter().any(|line| line.starts_with("TASKTREE_DEFAULT_CWD")));
}
