use crate::config::Config;
use crate::request::LaunchRequest;

pub enum DaemonEvent {
    /// The GUI wrote a launch request; run the launch-or-focus procedure.
    LaunchRequested(LaunchRequest),
    /// Periodic liveness sweep over all tracked characters.
    MonitorTick,
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; the daemon should write a final status and exit.
    Shutdown,
}
