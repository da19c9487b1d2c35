use camino::Utf8PathBuf;

pub const DEFAULT_HOME: &str = "strata-home";
pub const DEFAULT_API_LISTEN: &str = "127.0.0.1:8440";
pub const DEFAULT_SWARM_LISTEN: &str = "/ip4/0.0.0.0/tcp/2840";

#[must_use]
pub fn default_home() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_HOME)
}
