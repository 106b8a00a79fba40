fn main() {
    // ESP-IDF link args and sysenv are only needed for the firmware image.
    // Host builds (unit + integration tests) skip embuild entirely.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
