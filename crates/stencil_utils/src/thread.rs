use std::thread;

/// Label identifying the current thread in human-readable output.
///
/// Named threads use their name; anonymous threads fall back to the id.
pub fn thread_label() -> String {
    let current = thread::current();
    match current.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", current.id()),
    }
}
