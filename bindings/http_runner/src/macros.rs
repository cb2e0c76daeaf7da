/// Find a fixture file shipped with a scenario.
///
/// Looks in the scenario crate's `fixtures` directory first, then in a `fixtures` directory next
/// to the installed binary's parent directory.
#[macro_export]
macro_rules! fixture_path {
    ($name:literal) => {{
        let local_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("fixtures")
            .join($name);

        if let Ok(path) = local_path.canonicalize() {
            Ok(path)
        } else {
            let installed_path = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().and_then(|p| p.parent()).map(|p| p.to_path_buf()))
                .map(|p| p.join("fixtures").join($name));

            match installed_path.as_ref().and_then(|p| p.canonicalize().ok()) {
                Some(path) => Ok(path),
                None => Err(anyhow::anyhow!(
                    "Could not find the fixture at either the local path {local_path:?} or the installed path {installed_path:?}"
                )),
            }
        }
    }};
}
