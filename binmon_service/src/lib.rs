/// binmon_service: trash bin fill-level monitoring and full-bin notification service.
///
/// # Module structure
///
/// ```text
/// binmon_service
/// ├── model       - shared data types (BinSnapshot, ValidatedLevel, Recipient, BinError, …)
/// ├── level       - raw distance → fill percentage
/// ├── validate    - per-bin sliding window that accepts only stable readings
/// ├── alert
/// │   ├── thresholds - critical level gate
/// │   ├── recipients - admins + assigned users for a bin
/// │   └── dispatch   - notification persistence + SMS fan-out
/// ├── pipeline    - snapshot → level → gate → recipients → dispatch, per bin
/// ├── store
/// │   ├── db      - Postgres users, assignments, level history, notifications
/// │   └── memory  - in-process store for tests and dry runs
/// ├── ingest
/// │   └── realtime - realtime database feed the sensors write to
/// ├── messaging
/// │   └── vonage  - SMS gateway client
/// ├── simulate    - replay simulated distances
/// ├── config      - TOML settings + environment secrets
/// └── logging     - component/bin-tagged structured logging
/// ```

pub mod alert;
pub mod config;
pub mod ingest;
pub mod level;
pub mod logging;
pub mod messaging;
pub mod model;
pub mod pipeline;
pub mod simulate;
pub mod store;
pub mod validate;
