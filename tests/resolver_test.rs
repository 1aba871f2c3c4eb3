mod common;

use statewipe::profiles::{resolve, ApplicationProfile, MapEnv, Platform, PlatformPaths};

fn profile_with(linux: &[&str]) -> ApplicationProfile {
    ApplicationProfile {
        name: "test".into(),
        display_name: "Test".into(),
        process_names: vec![],
        paths: PlatformPaths {
            linux: linux.iter().map(|s| s.to_string()).collect(),
            ..PlatformPaths::default()
        },
    }
}

#[test]
fn test_missing_directories_mean_not_installed() {
    let fx = common::Fixture::new();
    let roots = resolve(&common::profile(), Platform::Linux, &fx.env());
    assert!(roots.is_empty());
}

#[test]
fn test_existing_directory_resolves() {
    let fx = common::Fixture::new();
    std::fs::create_dir_all(fx.app_root()).unwrap();

    let roots = resolve(&common::profile(), Platform::Linux, &fx.env());
    assert_eq!(roots, vec![std::fs::canonicalize(fx.app_root()).unwrap()]);
}

#[test]
fn test_duplicate_templates_collapse() {
    let fx = common::Fixture::new();
    std::fs::create_dir_all(fx.app_root()).unwrap();
    let env = fx.env().with_var("XDG_CONFIG_HOME", fx.home().join(".config").to_string_lossy());

    let profile = profile_with(&["${XDG_CONFIG_HOME}/Cursor", "~/.config/Cursor", "~/.config/./Cursor"]);
    assert_eq!(resolve(&profile, Platform::Linux, &env).len(), 1);
}

#[test]
fn test_glob_templates_expand() {
    let fx = common::Fixture::new();
    for name in ["Cursor-1", "Cursor-2", "Other"] {
        std::fs::create_dir_all(fx.home().join(".config").join(name)).unwrap();
    }
    std::fs::write(fx.home().join(".config/Cursor-file"), b"not a dir").unwrap();

    let roots = resolve(&profile_with(&["~/.config/Cursor-*"]), Platform::Linux, &fx.env());
    assert_eq!(roots.len(), 2);
    assert!(roots.iter().all(|r| r.file_name().unwrap().to_string_lossy().starts_with("Cursor-")));
}

#[test]
fn test_undefined_variables_and_relative_paths_skipped() {
    let fx = common::Fixture::new();
    std::fs::create_dir_all(fx.app_root()).unwrap();

    let profile = profile_with(&["${UNSET_VAR}/Cursor", "relative/Cursor", "~/.config/Cursor"]);
    let roots = resolve(&profile, Platform::Linux, &fx.env());
    assert_eq!(roots.len(), 1);

    // No home at all: every `~` template is skipped
    assert!(resolve(&profile, Platform::Linux, &MapEnv::new()).is_empty());
}

#[test]
fn test_platform_selects_templates() {
    let fx = common::Fixture::new();
    std::fs::create_dir_all(fx.app_root()).unwrap();
    let profile = profile_with(&["~/.config/Cursor"]);

    assert_eq!(resolve(&profile, Platform::Linux, &fx.env()).len(), 1);
    assert!(resolve(&profile, Platform::Windows, &fx.env()).is_empty());
}
