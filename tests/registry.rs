use std::time::{Duration, Instant};

use servicevisor::{MemoryRegistry, RegistryError, ServiceDefinition, ServiceRegistry};

fn demo() -> ServiceDefinition {
    ServiceDefinition::new("demo", "C:\\Program Files\\Demo\\demo.exe")
        .with_display_name("Demo Agent")
        .with_description("Runs the demo workload")
}

#[test]
fn test_install_without_privilege_is_denied() {
    let registry = MemoryRegistry::unprivileged();

    let err = registry.install(&demo()).unwrap_err();

    assert_eq!(
        err,
        RegistryError::PermissionDenied {
            operation: "install",
            service: "demo".to_string(),
        }
    );
    assert_eq!(err.as_label(), "registry_permission_denied");
    assert!(!registry.is_installed("demo"));
}

#[test]
fn test_install_start_stop_remove() {
    let registry = MemoryRegistry::elevated();

    registry.install(&demo()).unwrap();
    assert!(registry.is_installed("demo"));
    assert!(!registry.is_running("demo").unwrap());
    assert_eq!(
        registry.install(&demo()),
        Err(RegistryError::AlreadyExists {
            service: "demo".to_string()
        })
    );

    registry.start("demo").unwrap();
    assert!(registry.is_running("demo").unwrap());
    registry.stop("demo").unwrap();
    assert!(!registry.is_running("demo").unwrap());

    registry.remove("demo").unwrap();
    assert!(!registry.is_installed("demo"));
}

#[test]
fn test_operations_on_unknown_service_are_not_found() {
    let registry = MemoryRegistry::elevated();
    let not_found = RegistryError::NotFound {
        service: "ghost".to_string(),
    };

    assert_eq!(registry.start("ghost"), Err(not_found.clone()));
    assert_eq!(registry.stop("ghost"), Err(not_found.clone()));
    assert_eq!(registry.restart("ghost"), Err(not_found.clone()));
    assert_eq!(registry.remove("ghost"), Err(not_found));
}

#[test]
fn test_remove_stops_running_service() {
    let registry = MemoryRegistry::elevated();
    registry.install(&demo()).unwrap();
    registry.start("demo").unwrap();

    registry.remove("demo").unwrap();

    assert!(!registry.is_installed("demo"));
    assert!(!registry.is_running("demo").unwrap());
}

#[test]
fn test_restart_comes_back_after_grace() {
    let registry = MemoryRegistry::elevated().with_restart_grace(Duration::from_millis(50));
    registry.install(&demo()).unwrap();
    registry.start("demo").unwrap();

    registry.restart("demo").unwrap();
    assert!(!registry.is_running("demo").unwrap());

    let deadline = Instant::now() + Duration::from_secs(5);
    while !registry.is_running("demo").unwrap() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(registry.is_running("demo").unwrap());
}
