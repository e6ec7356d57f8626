use super::*;
use tempfile::TempDir;

fn registry_with(handlers: &[&str]) -> (HandlerRegistry, TempDir) {
    let root = TempDir::new().unwrap();
    let registry = HandlerRegistry::new(root.path());
    std::fs::create_dir_all(registry.handlers_dir()).unwrap();
    for name in handlers {
        std::fs::write(registry.handler_path(name), "# handler\n").unwrap();
    }
    (registry, root)
}

#[test]
fn test_handler_name_and_path() {
    let registry = HandlerRegistry::new(Path::new("/project"));
    assert_eq!(
        HandlerRegistry::handler_name("system.deploy"),
        "system.deploy-handler"
    );
    assert_eq!(
        registry.handler_path("system.deploy-handler"),
        PathBuf::from("/project/.claude/agents/event-handlers/system.deploy-handler.md")
    );
}

#[test]
fn test_exists() {
    let (registry, _root) = registry_with(&["system.deploy-handler"]);

    assert!(registry.exists("system.deploy-handler"));
    assert!(!registry.exists("system.other-handler"));
    assert!(!registry.exists(""));
    assert!(!registry.exists("../system.deploy-handler"));
    assert!(!registry.exists(".hidden"));
}

#[test]
fn test_discover_lists_markdown_stems() {
    let (registry, _root) = registry_with(&["b.event-handler", "a.event-handler"]);
    std::fs::write(registry.handlers_dir().join("notes.txt"), "x").unwrap();
    std::fs::create_dir(registry.handlers_dir().join("nested.md")).unwrap();

    assert_eq!(
        registry.discover(),
        vec!["a.event-handler".to_string(), "b.event-handler".to_string()]
    );
}

#[test]
fn test_discover_missing_directory() {
    let root = TempDir::new().unwrap();
    assert!(HandlerRegistry::new(root.path()).discover().is_empty());
}
