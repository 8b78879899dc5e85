//! Rows every fresh database needs.

use crate::Session;
use crate::error::Result;
use crate::models::DomElem;
use tracing::{debug, instrument};

/// DOM elements known out of the box, as `(bs_name, js_name)`.
pub const DOM_ELEMS: [(&str, &str); 2] = [("div", "DIV"), ("a", "A")];

/// Seed the default DOM elements. Elements that already exist are left alone,
/// so running this twice is harmless.
#[instrument(skip(session))]
pub async fn create(session: &mut Session) -> Result<Vec<DomElem>> {
    let mut elems = Vec::with_capacity(DOM_ELEMS.len());
    for (bs_name, js_name) in DOM_ELEMS {
        if let Some(existing) = session.dom_elem_by_bs_name(bs_name).await? {
            elems.push(existing);
            continue;
        }
        let id = session.create_dom_elem(bs_name, js_name).await?;
        debug!(bs_name, js_name, "default DOM element created");
        elems.push(DomElem { id, bs_name: bs_name.to_string(), js_name: js_name.to_string() });
    }
    Ok(elems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        let mut session = db.begin().await.unwrap();
        let first = create(&mut session).await.unwrap();
        let second = create(&mut session).await.unwrap();
        assert_eq!(first, second);
        let div = session.dom_elem_by_js_name("DIV").await.unwrap().unwrap();
        assert_eq!(div.bs_name, "div");
        session.commit().await.unwrap();
        db.close().await;
    }
}
