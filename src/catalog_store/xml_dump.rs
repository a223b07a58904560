//! Read-only XML export of the catalog hierarchy.
//!
//! A debugging and external-tooling view, not a round-trip format: the
//! binary snapshot in `persist` is the only format the store reads back.

use super::CatalogStore;
use anyhow::Result;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use std::io::Write;

impl CatalogStore {
    /// Write the entity hierarchy as an XML tree.
    pub fn dump_xml<W: Write>(&self, out: W) -> Result<()> {
        let mut writer = Writer::new_with_indent(out, b' ', 2);

        let mut root = BytesStart::new("catalog");
        root.push_attribute(("categories", self.category_count().to_string().as_str()));
        root.push_attribute(("titles", self.title_set_count().to_string().as_str()));
        writer.write_event(Event::Start(root))?;

        writer.write_event(Event::Start(BytesStart::new("categories")))?;
        for category in self.categories() {
            let mut elem = BytesStart::new("category");
            elem.push_attribute(("id", category.id.to_string().as_str()));
            elem.push_attribute(("name", category.name()));
            elem.push_attribute(("media", category.core.media_type.to_string().as_str()));
            writer.write_event(Event::Empty(elem))?;
        }
        writer.write_event(Event::End(BytesEnd::new("categories")))?;

        writer.write_event(Event::Start(BytesStart::new("titles")))?;
        for title in self.title_sets_by_sequence() {
            let mut title_elem = BytesStart::new("title");
            title_elem.push_attribute(("id", title.id.to_string().as_str()));
            title_elem.push_attribute(("name", title.core.name.as_str()));
            title_elem.push_attribute(("sortTitle", title.sort_title()));
            title_elem.push_attribute(("sequence", title.sequence.to_string().as_str()));
            title_elem.push_attribute(("media", title.core.media_type.to_string().as_str()));
            if !title.aggregates.artist.is_empty() {
                title_elem.push_attribute(("artist", title.aggregates.artist.as_str()));
            }
            writer.write_event(Event::Start(title_elem))?;

            for collection_id in &title.collections {
                let Some(collection) = self.collection(*collection_id) else {
                    continue;
                };
                let mut col_elem = BytesStart::new("collection");
                col_elem.push_attribute(("id", collection.id.to_string().as_str()));
                col_elem.push_attribute(("name", collection.core.name.as_str()));
                if !collection.artist.is_empty() {
                    col_elem.push_attribute(("artist", collection.artist.as_str()));
                }
                if collection.year != 0 {
                    col_elem.push_attribute(("year", collection.year.to_string().as_str()));
                }
                if collection.is_playlist {
                    col_elem.push_attribute(("playlist", "true"));
                }
                writer.write_event(Event::Start(col_elem))?;

                for item_id in &collection.items {
                    let Some(item) = self.item(*item_id) else {
                        continue;
                    };
                    let mut item_elem = BytesStart::new("item");
                    item_elem.push_attribute(("id", item.id.to_string().as_str()));
                    item_elem.push_attribute(("name", item.core.name.as_str()));
                    if !item.artist.is_empty() {
                        item_elem.push_attribute(("artist", item.artist.as_str()));
                    }
                    if item.duration_secs != 0 {
                        item_elem
                            .push_attribute(("duration", item.duration_secs.to_string().as_str()));
                    }
                    writer.write_event(Event::Empty(item_elem))?;
                }

                writer.write_event(Event::End(BytesEnd::new("collection")))?;
            }

            writer.write_event(Event::End(BytesEnd::new("title")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("titles")))?;

        writer.write_event(Event::End(BytesEnd::new("catalog")))?;
        Ok(())
    }
}
