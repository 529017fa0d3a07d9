// src/fetch/portal.rs
use anyhow::{anyhow, Result};
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

/// Id of the "download CSV" control on the procedures page.
pub const CSV_BUTTON_ID: &str = "btnRegistroCsv";

/// Attributes that may carry the export target on the button or link.
const LINK_ATTRS: &[&str] = &["href", "data-href", "data-url", "formaction"];

const MAX_RETRIES: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Export links behind the CSV button, resolved against the page URL.
pub fn find_csv_links(html: &str, base: &Url) -> Vec<Url> {
    let selector = Selector::parse(&format!(
        "a#{id}, button#{id}, input#{id}",
        id = CSV_BUTTON_ID
    ))
    .expect("Invalid CSS selector for CSV button");
    let doc = Html::parse_document(html);
    let mut links: Vec<Url> = Vec::new();
    for elem in doc.select(&selector) {
        for attr in LINK_ATTRS {
            let Some(href) = elem.value().attr(attr) else {
                continue;
            };
            let href = href.trim();
            if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
                continue;
            }
            match base.join(href) {
                Ok(u) if !links.contains(&u) => links.push(u),
                Ok(_) => {}
                Err(e) => debug!(href, "unusable link on CSV button: {}", e),
            }
        }
    }
    links
}

/// GET the procedures page, retrying transient failures.
pub async fn fetch_page(client: &Client, page_url: &Url) -> Result<String> {
    let mut attempt = 0;
    loop {
        attempt += 1;

        // 1) fetch page
        let resp = client.get(page_url.as_str()).send().await;
        match resp {
            Ok(resp) if resp.status().is_success() => {
                // 2) get body text
                match resp.text().await {
                    Ok(html) => return Ok(html),
                    Err(_) if attempt < MAX_RETRIES => {
                        sleep(RETRY_DELAY).await;
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) if attempt < MAX_RETRIES => {
                warn!(attempt, "GET {} failed: {}", page_url, e);
                sleep(RETRY_DELAY).await;
                continue;
            }
            Ok(resp) => return Err(anyhow!("HTTP error: {}", resp.status())),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Download one export link. Only a successful, non-empty body counts.
pub async fn download_csv(client: &Client, link: &Url) -> Result<Vec<u8>> {
    let resp = client.get(link.as_str()).send().await?.error_for_status()?;
    let bytes = resp.bytes().await?;
    if bytes.is_empty() {
        return Err(anyhow!("empty body from {}", link));
    }
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.boletinconcursal.cl/boletin/procedimientos").unwrap()
    }

    #[test]
    fn test_find_csv_links_resolves_relative_href() {
        let html = r#"<html><body>
            <a id="otro" href="/boletin/otro.csv">otro</a>
            <a id="btnRegistroCsv" href="/boletin/procedimientos/csv">Descargar CSV</a>
        </body></html>"#;
        let links = find_csv_links(html, &base());
        assert_eq!(
            links,
            vec![Url::parse("https://www.boletinconcursal.cl/boletin/procedimientos/csv").unwrap()]
        );
    }

    #[test]
    fn test_find_csv_links_button_data_attrs() {
        let html = r#"<form><button id="btnRegistroCsv" type="submit"
            data-href="exportar?formato=csv" formaction="exportar?formato=csv">CSV</button></form>"#;
        let links = find_csv_links(html, &base());
        // same target from two attributes is kept once
        let expected = Url::parse("https://www.boletinconcursal.cl/boletin/exportar?formato=csv");
        assert_eq!(links, vec![expected.unwrap()]);
    }

    #[test]
    fn test_find_csv_links_ignores_script_only_button() {
        let html = r##"<button id="btnRegistroCsv" onclick="descargar()">CSV</button>
            <a id="btnRegistroCsv" href="#">CSV</a>
            <a id="btnRegistroCsv" href="javascript:void(0)">CSV</a>"##;
        assert!(find_csv_links(html, &base()).is_empty());
    }
}
