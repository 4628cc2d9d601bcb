use vmreserve::images::{loaded_modules, module_containing};

#[test]
fn snapshot_includes_main_executable() {
    let modules = loaded_modules();
    assert!(!modules.is_empty());

    for record in &modules {
        assert!(record.end > record.start, "empty code range for {}", record.path);
    }

    let exe = std::env::current_exe().unwrap();
    let exe_name = exe.file_name().unwrap().to_string_lossy().into_owned();
    assert!(
        modules.iter().any(|record| record.path.ends_with(&exe_name)),
        "main executable {} missing",
        exe_name
    );
}

#[test]
fn code_addresses_resolve_to_an_image() {
    let address = snapshot_includes_main_executable as usize;
    let record = module_containing(address).expect("test code is not inside any image");
    assert!(record.start <= address && address < record.end);
}

#[test]
fn records_serialize() {
    let modules = loaded_modules();
    let json = serde_json::to_value(&modules).unwrap();
    let first = &json[0];
    assert!(first["path"].is_string());
    assert!(first["end"].as_u64().unwrap() > first["start"].as_u64().unwrap());
}
