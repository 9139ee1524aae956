//! Plain-text rendering of channels for the output files.

use super::channel::Channel;
use super::model::FieldMap;
use super::settings::FeedSettings;

/// Writes each whitelisted field present in `fields` as
///
/// ```text
/// {tabs}key:
/// {tabs}\tvalue
/// ```
///
/// in whitelist order, followed by one blank line.
pub fn render_fields(fields: &FieldMap, whitelist: &[String], indent: usize) -> String {
    let tabs = "\t".repeat(indent);
    let mut out = String::new();

    for key in whitelist {
        if let Some(value) = fields.get(key) {
            out.push_str(&format!("{tabs}{key}:\n{tabs}\t{value}\n"));
        }
    }
    out.push('\n');
    out
}

/// Channel fields at the left margin, then each item one tab in.
pub fn render_channel(channel: &Channel, settings: &FeedSettings) -> String {
    let mut out = render_fields(&channel.meta_body, &settings.channel_fields, 0);
    for item in &channel.items {
        out.push_str(&render_fields(&item.body, &settings.item_fields, 1));
    }
    out
}
