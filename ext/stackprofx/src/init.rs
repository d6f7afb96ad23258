/// Sets up logging. Without the `debug` feature this does nothing and log
/// records are left to whatever logger the host installs.
pub fn init() {
    #[cfg(feature = "debug")]
    {
        let _ = env_logger::builder()
            .format_timestamp(None)
            .format_module_path(false)
            .try_init();
    }
}
