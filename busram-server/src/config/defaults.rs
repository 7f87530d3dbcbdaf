//! Default configuration values
//!
//! Embedded in the binary and parsed when no config file exists.

/// Default configuration as TOML, kept in step with the schema defaults
pub const DEFAULT_CONFIG_TOML: &str = r##"
# busram configuration

[server]
listen_addr = "0.0.0.0:8000"
base_path = "/mcp"
keepalive_secs = 15
cors_allow_origin = "*"

[gateway]
# "probe": token-less POSTs are health checks
# "default-session": token-less POSTs go to the session opened with
#                    GET <base_path>?session_id=<default_session_id>
tokenless_post = "probe"
default_session_id = "default"

[upstream]
base_url = "https://apis.data.go.kr/1613000"
# service_key = ""   # or set BUSRAM_SERVICE_KEY
timeout_secs = 10
station_rows = 5
arrival_rows = 10

[logging]
filter = "info"
output = "stderr"
"##;
