/// Deciding when a bin needs attention, and telling the right people.
///
/// Submodules:
/// - `thresholds` - critical level gate.
/// - `recipients` - admins plus assigned users for a bin.
/// - `dispatch`   - persists the notification and texts recipients.

pub mod dispatch;
pub mod recipients;
pub mod thresholds;
