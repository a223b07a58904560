//! Cookie codec: compact text keys for hierarchical catalog positions.
//!
//! A cookie is the media-type tag followed by one to four decimal local
//! IDs, joined by `':'`. The token count determines the kind, each kind a
//! strict prefix-extension of the previous:
//!
//! ```text
//! mus:3          category   (media type + category)
//! mus:3:17       title      (+ title set)
//! mus:3:17:2     collection (+ collection)
//! mus:3:17:2:9   item       (+ item)
//! ```
//!
//! Category ID 0 addresses the whole media type ("all categories"); every
//! deeper ID is 1-based. The codec is pure and stateless: no catalog
//! lookups happen here, so a well-formed cookie may still name entities
//! that do not exist in a given snapshot. That is `NotFound` at resolve
//! time, never `BadCookie`.

use crate::catalog::{CategoryId, CollectionId, ItemId, MediaType, TitleId};
use crate::error::{CatalogError, Result};

const DELIMITER: char = ':';
const MAX_ID_TOKENS: usize = 4;

/// The four cookie kinds, ordered shallow to deep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CookieKind {
    Category,
    Title,
    Collection,
    Item,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CategoryCookie {
    pub media_type: MediaType,
    pub category: CategoryId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TitleCookie {
    pub media_type: MediaType,
    pub category: CategoryId,
    pub title: TitleId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectionCookie {
    pub media_type: MediaType,
    pub category: CategoryId,
    pub title: TitleId,
    pub collection: CollectionId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ItemCookie {
    pub media_type: MediaType,
    pub category: CategoryId,
    pub title: TitleId,
    pub collection: CollectionId,
    pub item: ItemId,
}

pub fn format_category_cookie(media_type: MediaType, category: CategoryId) -> String {
    format!("{}{}{}", media_type.tag(), DELIMITER, category)
}

pub fn format_title_cookie(media_type: MediaType, category: CategoryId, title: TitleId) -> String {
    format!(
        "{}{d}{}{d}{}",
        media_type.tag(),
        category,
        title,
        d = DELIMITER
    )
}

pub fn format_collection_cookie(
    media_type: MediaType,
    category: CategoryId,
    title: TitleId,
    collection: CollectionId,
) -> String {
    format!(
        "{}{d}{}{d}{}{d}{}",
        media_type.tag(),
        category,
        title,
        collection,
        d = DELIMITER
    )
}

pub fn format_item_cookie(
    media_type: MediaType,
    category: CategoryId,
    title: TitleId,
    collection: CollectionId,
    item: ItemId,
) -> String {
    format!(
        "{}{d}{}{d}{}{d}{}{d}{}",
        media_type.tag(),
        category,
        title,
        collection,
        item,
        d = DELIMITER
    )
}

/// Tokenized cookie: media type plus up to four IDs, in hierarchy order.
struct Tokens {
    media_type: MediaType,
    ids: [u16; MAX_ID_TOKENS],
    id_count: usize,
}

fn bad(text: &str, reason: &str) -> CatalogError {
    CatalogError::BadCookie(format!("{:?}: {}", text, reason))
}

fn tokenize(text: &str) -> Result<Tokens> {
    let mut parts = text.split(DELIMITER);
    let tag = parts.next().unwrap_or("");
    let media_type =
        MediaType::from_tag(tag).ok_or_else(|| bad(text, "unknown media type tag"))?;

    let mut ids = [0u16; MAX_ID_TOKENS];
    let mut id_count = 0usize;
    for part in parts {
        if id_count == MAX_ID_TOKENS {
            return Err(bad(text, "too many tokens"));
        }
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad(text, "id token is not a number"));
        }
        let value: u16 = part
            .parse()
            .map_err(|_| bad(text, "id token out of range"))?;
        // Only the category position may be 0 (whole media type).
        if value == 0 && id_count > 0 {
            return Err(bad(text, "id token out of range"));
        }
        ids[id_count] = value;
        id_count += 1;
    }
    if id_count == 0 {
        return Err(bad(text, "missing id tokens"));
    }
    Ok(Tokens {
        media_type,
        ids,
        id_count,
    })
}

/// Classify arbitrary text into one of the four cookie kinds.
pub fn check_cookie(text: &str) -> Result<CookieKind> {
    let tokens = tokenize(text)?;
    Ok(match tokens.id_count {
        1 => CookieKind::Category,
        2 => CookieKind::Title,
        3 => CookieKind::Collection,
        4 => CookieKind::Item,
        _ => unreachable!("tokenize bounds id_count to 1..=4"),
    })
}

fn expect_kind(text: &str, tokens: &Tokens, expected: CookieKind) -> Result<()> {
    let actual = match tokens.id_count {
        1 => CookieKind::Category,
        2 => CookieKind::Title,
        3 => CookieKind::Collection,
        _ => CookieKind::Item,
    };
    if actual != expected {
        return Err(bad(text, "wrong token count for cookie kind"));
    }
    Ok(())
}

pub fn parse_category_cookie(text: &str) -> Result<CategoryCookie> {
    let tokens = tokenize(text)?;
    expect_kind(text, &tokens, CookieKind::Category)?;
    Ok(CategoryCookie {
        media_type: tokens.media_type,
        category: CategoryId(tokens.ids[0]),
    })
}

pub fn parse_title_cookie(text: &str) -> Result<TitleCookie> {
    let tokens = tokenize(text)?;
    expect_kind(text, &tokens, CookieKind::Title)?;
    Ok(TitleCookie {
        media_type: tokens.media_type,
        category: CategoryId(tokens.ids[0]),
        title: TitleId(tokens.ids[1]),
    })
}

pub fn parse_collection_cookie(text: &str) -> Result<CollectionCookie> {
    let tokens = tokenize(text)?;
    expect_kind(text, &tokens, CookieKind::Collection)?;
    Ok(CollectionCookie {
        media_type: tokens.media_type,
        category: CategoryId(tokens.ids[0]),
        title: TitleId(tokens.ids[1]),
        collection: CollectionId(tokens.ids[2]),
    })
}

pub fn parse_item_cookie(text: &str) -> Result<ItemCookie> {
    let tokens = tokenize(text)?;
    expect_kind(text, &tokens, CookieKind::Item)?;
    Ok(ItemCookie {
        media_type: tokens.media_type,
        category: CategoryId(tokens.ids[0]),
        title: TitleId(tokens.ids[1]),
        collection: CollectionId(tokens.ids[2]),
        item: ItemId(tokens.ids[3]),
    })
}
