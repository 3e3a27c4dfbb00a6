//! Extraction of typed rows from Sympa's rendered HTML pages.
//!
//! Sympa has no machine-readable output, so everything here works off the
//! positional structure of the web UI: the review table, the bounce review
//! table, the identity banner, and the sidebar list-of-lists menu. Structure
//! problems are never fatal; a missing table is `None` and a malformed row
//! is skipped, leaving the caller to decide what the absence means.

use chrono::NaiveDate;
use listward_core::{BounceRow, SubscriberRow};
use scraper::{ElementRef, Html, Selector};

pub const CRATE_NAME: &str = "listward-scrape";

/// Roles in the identity banner that carry list-administration rights.
pub const PRIV_ROLES: &[&str] = &[
    "Privileged owner",
    "Owner",
    "Moderator",
    "Privileged moderator",
];

/// Subscriber review table, in its usual position.
const SUBSCRIBERS_SELECTOR: &str =
    "#Paint > div:nth-of-type(4) > div > form:nth-of-type(4) > fieldset > table";
/// Review table position when a notification banner is prepended to the form.
const SUBSCRIBERS_ALT_SELECTOR: &str =
    "#Paint > div:nth-of-type(4) > div:nth-of-type(2) > form:nth-of-type(5) > fieldset > table";
/// Bounce review table.
const BOUNCING_SELECTOR: &str =
    "#Paint > div:nth-of-type(4) > form:nth-of-type(4) > fieldset > table";
/// Identity banner naming the logged-in user and their role.
const IDENTITY_SELECTOR: &str = "#Identity";
/// Sidebar list-of-lists menu links.
const LISTS_SELECTOR: &str = "#Menus > div:nth-of-type(3) > ul > li > a";

/// Dates render as e.g. `01 Mar 2024` throughout the UI.
const PAGE_DATE_FORMAT: &str = "%d %b %Y";

pub fn parse_page_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), PAGE_DATE_FORMAT).ok()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn text_or_none(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// The email cell wraps the address in a link; take the first child
/// element's text, falling back to the cell's own text.
fn cell_email(cell: ElementRef<'_>) -> Option<String> {
    let from_child = cell
        .children()
        .filter_map(ElementRef::wrap)
        .next()
        .map(element_text);
    text_or_none(from_child.unwrap_or_else(|| element_text(cell)))
}

fn cells_of(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let td = Selector::parse("td").expect("static selector");
    row.select(&td).collect()
}

fn table_rows<'a>(document: &'a Html, selector: &str) -> Option<Vec<ElementRef<'a>>> {
    let table_sel = Selector::parse(selector).ok()?;
    let table = document.select(&table_sel).next()?;
    let tr = Selector::parse("tr").expect("static selector");
    Some(table.select(&tr).collect())
}

/// Rows of the subscriber review table, or `None` when the table is absent
/// (which the caller disambiguates via the privilege flag). Checks the
/// usual table position first, then the alternate position used when a
/// notification occupies the top of the form.
pub fn parse_subscriber_rows(html: &str) -> Option<Vec<SubscriberRow>> {
    let document = Html::parse_document(html);
    let rows = table_rows(&document, SUBSCRIBERS_SELECTOR)
        .or_else(|| table_rows(&document, SUBSCRIBERS_ALT_SELECTOR))?;

    // One header row, then one row per subscriber.
    let parsed = rows
        .into_iter()
        .skip(1)
        .filter_map(|row| subscriber_row(row))
        .collect();
    Some(parsed)
}

fn subscriber_row(row: ElementRef<'_>) -> Option<SubscriberRow> {
    let mut cells = cells_of(row);
    if cells.len() == 9 {
        // A pending status notification gets its own cell; drop it so the
        // remaining columns line up with the plain 8-column layout.
        cells.remove(3);
    }
    if cells.len() < 8 {
        return None;
    }

    let email = cell_email(cells[1])?;
    let span = Selector::parse("span").expect("static selector");
    let name = cells[3]
        .select(&span)
        .next()
        .map(element_text)
        .unwrap_or_else(|| element_text(cells[3]));

    Some(SubscriberRow {
        email,
        name,
        reception: text_or_none(element_text(cells[4])),
        sources: text_or_none(element_text(cells[5])),
        sub_date: parse_page_date(&element_text(cells[6])),
        last_update: parse_page_date(&element_text(cells[7])),
    })
}

/// Rows of the bounce review table, or `None` when the table is absent.
/// The table opens with two header rows.
pub fn parse_bounce_rows(html: &str) -> Option<Vec<BounceRow>> {
    let document = Html::parse_document(html);
    let rows = table_rows(&document, BOUNCING_SELECTOR)?;

    let parsed = rows
        .into_iter()
        .skip(2)
        .filter_map(|row| bounce_row(row))
        .collect();
    Some(parsed)
}

fn bounce_row(row: ElementRef<'_>) -> Option<BounceRow> {
    let cells = cells_of(row);
    if cells.len() < 6 {
        return None;
    }

    let email = cell_email(cells[1])?;
    let count = element_text(cells[3]).parse().unwrap_or(0);

    Some(BounceRow {
        email,
        score: text_or_none(element_text(cells[2])),
        count,
        first: parse_page_date(&element_text(cells[4])),
        last: parse_page_date(&element_text(cells[5])),
    })
}

/// The role line of the identity banner. The banner's first text node is
/// the user's address; the role follows on its own line.
pub fn parse_privilege_role(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let sel = Selector::parse(IDENTITY_SELECTOR).ok()?;
    let banner = document.select(&sel).next()?;
    let lines: Vec<String> = banner
        .text()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    lines.get(1).or_else(|| lines.first()).cloned()
}

/// Whether a role string carries administration rights. Matches by
/// containment, since the banner decorates the role with surrounding text.
pub fn is_privileged_role(role: &str) -> bool {
    PRIV_ROLES.iter().any(|r| role.contains(r))
}

/// List names from the sidebar list-of-lists menu: the last path segment of
/// each link.
pub fn parse_list_names(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(sel) = Selector::parse(LISTS_SELECTOR) else {
        return Vec::new();
    };
    document
        .select(&sel)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| {
            let name = href.trim_end_matches('/').rsplit('/').next()?;
            text_or_none(name.trim().to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review_page(rows: &str) -> String {
        format!(
            r#"<html><body>
<div id="Identity">admin@example.edu<br> Privileged owner </div>
<div id="Paint">
  <div></div><div></div><div></div>
  <div>
    <div>
      <form></form><form></form><form></form>
      <form><fieldset><table>
        <tr><th>sel</th><th>email</th><th>pic</th><th>name</th><th>reception</th><th>sources</th><th>sub</th><th>upd</th></tr>
        {rows}
      </table></fieldset></form>
    </div>
  </div>
</div>
</body></html>"#
        )
    }

    const ALICE_ROW: &str = r#"<tr>
      <td><input type="checkbox"/></td>
      <td><a href="?email=a@x.com">a@x.com</a></td>
      <td></td>
      <td><span>Alice Example</span></td>
      <td>mail</td>
      <td>subscribed</td>
      <td>01 Mar 2024</td>
      <td>02 Apr 2024</td>
    </tr>"#;

    #[test]
    fn subscriber_rows_from_primary_table() {
        let html = review_page(ALICE_ROW);
        let rows = parse_subscriber_rows(&html).expect("table present");
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.email, "a@x.com");
        assert_eq!(row.name, "Alice Example");
        assert_eq!(row.reception.as_deref(), Some("mail"));
        assert_eq!(row.sources.as_deref(), Some("subscribed"));
        assert_eq!(row.sub_date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(row.last_update, NaiveDate::from_ymd_opt(2024, 4, 2));
    }

    #[test]
    fn subscriber_rows_from_alternate_table_position() {
        // A notification div shifts the review form into the second inner
        // div, one form later.
        let html = r#"<html><body>
<div id="Paint">
  <div></div><div></div><div></div>
  <div>
    <div>notification</div>
    <div>
      <form></form><form></form><form></form><form></form>
      <form><fieldset><table>
        <tr><th>h</th></tr>
        <tr>
          <td></td>
          <td><a>b@x.com</a></td>
          <td></td>
          <td><span>Bob</span></td>
          <td>digest</td>
          <td>subscribed</td>
          <td>05 Jan 2023</td>
          <td>06 Jan 2023</td>
        </tr>
      </table></fieldset></form>
    </div>
  </div>
</div>
</body></html>"#;
        let rows = parse_subscriber_rows(html).expect("alternate table present");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].email, "b@x.com");
        assert_eq!(rows[0].reception.as_deref(), Some("digest"));
    }

    #[test]
    fn nine_column_row_drops_status_cell() {
        let row = r#"<tr>
      <td></td>
      <td><a>c@x.com</a></td>
      <td></td>
      <td>pending</td>
      <td><span>Carol</span></td>
      <td>mail</td>
      <td>included</td>
      <td>10 Feb 2024</td>
      <td>11 Feb 2024</td>
    </tr>"#;
        let html = review_page(row);
        let rows = parse_subscriber_rows(&html).expect("table present");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].email, "c@x.com");
        assert_eq!(rows[0].name, "Carol");
        assert_eq!(rows[0].sources.as_deref(), Some("included"));
    }

    #[test]
    fn missing_table_is_none_but_empty_table_is_empty() {
        assert!(parse_subscriber_rows("<html><body><p>denied</p></body></html>").is_none());

        let html = review_page("");
        let rows = parse_subscriber_rows(&html).expect("table present");
        assert!(rows.is_empty());
    }

    #[test]
    fn row_without_email_is_skipped() {
        let row = r#"<tr>
      <td></td><td></td><td></td>
      <td><span>Nobody</span></td>
      <td>mail</td><td>subscribed</td>
      <td>01 Mar 2024</td><td>02 Mar 2024</td>
    </tr>"#;
        let html = review_page(&format!("{ALICE_ROW}{row}"));
        let rows = parse_subscriber_rows(&html).expect("table present");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].email, "a@x.com");
    }

    #[test]
    fn bounce_rows_parse_and_skip_two_headers() {
        let html = r#"<html><body>
<div id="Paint">
  <div></div><div></div><div></div>
  <div>
    <form></form><form></form><form></form>
    <form><fieldset><table>
      <tr><th>first header</th></tr>
      <tr><th>second header</th></tr>
      <tr>
        <td></td>
        <td><a>d@x.com</a></td>
        <td>45.25</td>
        <td>12</td>
        <td>03 May 2024</td>
        <td>20 Jun 2024</td>
      </tr>
    </table></fieldset></form>
  </div>
</div>
</body></html>"#;
        let rows = parse_bounce_rows(html).expect("bounce table present");
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.email, "d@x.com");
        assert_eq!(row.score.as_deref(), Some("45.25"));
        assert_eq!(row.count, 12);
        assert_eq!(row.first, NaiveDate::from_ymd_opt(2024, 5, 3));
        assert_eq!(row.last, NaiveDate::from_ymd_opt(2024, 6, 20));
    }

    #[test]
    fn bounce_table_missing_is_none() {
        assert!(parse_bounce_rows("<html><body></body></html>").is_none());
    }

    #[test]
    fn privilege_role_is_second_banner_line() {
        let html = r#"<div id="Identity">admin@example.edu<br>Privileged owner</div>"#;
        let role = parse_privilege_role(html).expect("role");
        assert_eq!(role, "Privileged owner");
        assert!(is_privileged_role(&role));
    }

    #[test]
    fn subscriber_role_is_not_privileged() {
        assert!(!is_privileged_role("Subscriber"));
        assert!(is_privileged_role("Role: Moderator"));
    }

    #[test]
    fn list_names_come_from_sidebar_hrefs() {
        let html = r#"<html><body>
<div id="Menus">
  <div></div><div></div>
  <div><ul>
    <li><a href="https://lists.example.edu/sympa/info/devlist">devlist</a></li>
    <li><a href="/sympa/info/announce">announce</a></li>
  </ul></div>
</div>
</body></html>"#;
        assert_eq!(parse_list_names(html), vec!["devlist", "announce"]);
    }

    #[test]
    fn unparseable_dates_degrade_to_none() {
        assert_eq!(parse_page_date("01 Mar 2024"), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert!(parse_page_date("yesterday").is_none());
        assert!(parse_page_date("").is_none());
    }
}
