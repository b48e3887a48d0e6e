use chrono::Local;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::models::{item_id_from_url, item_url, normalize_href, Product};
use crate::utils::error::{AppError, Result};

/// Subdirectory of the data directory holding extracted product lists.
pub const EXTRACTED_DIR: &str = "extracted_data";

const PRODUCT_HEADER: &str = "name,url";
const ITEM_LINK_HOST: &str = "item.taobao.com";
const MIN_LOOSE_TITLE_CHARS: usize = 10;

static DIV: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div").expect("div selector parses"));
static ANY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("*").expect("universal selector parses"));
static SPAN: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").expect("span selector parses"));
static ITEM_LINK: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"a[href*="item.taobao.com"]"#).expect("item link selector parses")
});

fn class_of<'a>(el: &ElementRef<'a>) -> &'a str {
    el.value().attr("class").unwrap_or_default()
}

fn trimmed_text(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Product cards in order of preference: explicit card containers, then divs with
/// card/item/product classes, then the nearest div around each item link.
fn find_cards(doc: &Html) -> Vec<ElementRef<'_>> {
    let containers: Vec<_> = doc
        .select(&DIV)
        .filter(|div| class_of(div).contains("cardContainer"))
        .collect();
    if !containers.is_empty() {
        return containers;
    }

    for fragment in ["card", "item", "product"] {
        let divs: Vec<_> = doc
            .select(&DIV)
            .filter(|div| class_of(div).to_lowercase().contains(fragment))
            .collect();
        if !divs.is_empty() {
            return divs;
        }
    }

    let mut seen = HashSet::new();
    doc.select(&ITEM_LINK)
        .filter_map(|link| {
            link.ancestors()
                .take(3)
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "div")
        })
        .filter(|div| seen.insert(div.id()))
        .collect()
}

/// First non-empty title candidate inside a card.
fn card_title(card: &ElementRef) -> Option<String> {
    let text_only_longer_than = |el: &ElementRef| {
        el.children().all(|node| node.value().is_text())
            && trimmed_text(el).chars().count() > MIN_LOOSE_TITLE_CHARS
    };

    let candidates = [
        card.select(&DIV).find(|el| class_of(el).to_lowercase().contains("title")),
        card.select(&ANY).find(|el| class_of(el).contains("Title")),
        card.select(&ANY).find(|el| class_of(el).to_lowercase().contains("title")),
        card.select(&DIV).find(|el| text_only_longer_than(el)),
        card.select(&SPAN).find(|el| text_only_longer_than(el)),
    ];

    candidates
        .into_iter()
        .flatten()
        .map(|el| trimmed_text(&el))
        .find(|title| !title.is_empty())
}

/// Pulls `(name, url)` pairs out of a saved listing page. Cards without an item
/// link are skipped; the same item is only listed once.
pub fn extract_products(html: &str) -> Vec<Product> {
    let doc = Html::parse_document(html);
    let cards = find_cards(&doc);
    tracing::info!(cards = cards.len(), "Product cards found");

    let mut seen = HashSet::new();
    let mut products = Vec::new();
    for (index, card) in cards.iter().enumerate() {
        let Some(href) = card
            .select(&ITEM_LINK)
            .find_map(|link| link.value().attr("href"))
            .filter(|href| href.contains(ITEM_LINK_HOST))
        else {
            tracing::debug!(card = index + 1, "Card has no item link");
            continue;
        };

        let item_id = item_id_from_url(href);
        let url = match &item_id {
            Some(id) => item_url(id),
            None => normalize_href(href),
        };
        if !seen.insert(url.clone()) {
            continue;
        }

        let name = card_title(card).unwrap_or_else(|| {
            format!("商品_{}", item_id.as_deref().unwrap_or("未知"))
        });
        tracing::debug!(card = index + 1, total = cards.len(), "Extracted {}", name);
        products.push(Product::new(name, url));
    }

    products
}

/// Writes a headered `name,url` product file.
pub fn write_products(path: &Path, products: &[Product]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    if products.is_empty() {
        writer.write_record(["name", "url"])?;
    }
    for product in products {
        writer.serialize(product)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a product file. Headered CSV is parsed as such; files without the
/// `name,url` header are read as bare lines split on the first comma.
pub fn read_products(path: &Path) -> Result<Vec<Product>> {
    let raw = std::fs::read_to_string(path)?;
    let content = raw.trim_start_matches('\u{feff}');

    let first_line = content.lines().next().unwrap_or_default().trim();
    if first_line == PRODUCT_HEADER {
        let mut reader = csv::Reader::from_reader(content.as_bytes());
        let mut products = Vec::new();
        for row in reader.deserialize() {
            let product: Product = row?;
            if !product.url.is_empty() {
                products.push(product);
            }
        }
        return Ok(products);
    }

    Ok(content.lines().filter_map(Product::parse_line).collect())
}

/// Most recently modified `products_*.csv` in `dir`.
pub fn latest_product_file(dir: &Path) -> Result<PathBuf> {
    let entries = std::fs::read_dir(dir).map_err(|_| AppError::NotFound {
        resource: format!("directory {}", dir.display()),
    })?;

    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with("products_") && name.ends_with(".csv")
        })
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, entry.path()))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
        .ok_or_else(|| AppError::NotFound {
            resource: format!("products_*.csv in {}", dir.display()),
        })
}

/// Default output location: `<data_dir>/extracted_data/products_<timestamp>.csv`.
pub fn default_output_path(data_dir: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    data_dir
        .join(EXTRACTED_DIR)
        .join(format!("products_{}.csv", timestamp))
}

/// Extracts products from a saved HTML file and writes them to `output`.
pub fn extract_product_file(html_file: &Path, output: &Path) -> Result<Vec<Product>> {
    let bytes = std::fs::read(html_file)?;
    let html = match String::from_utf8(bytes) {
        Ok(html) => html,
        Err(e) => {
            tracing::warn!("{} is not valid UTF-8, decoding lossily", html_file.display());
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };

    let products = extract_products(&html);
    write_products(output, &products)?;
    tracing::info!(count = products.len(), "Product list written to {}", output.display());
    Ok(products)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CARD_PAGE: &str = r#"
        <html><body>
          <div class="cardContainer--x1">
            <a href="//item.taobao.com/item.htm?spm=a1z10&id=1001&ns=1">
              <div class="title--abc"> 原创亚克力立牌 </div>
            </a>
          </div>
          <div class="cardContainer--x1">
            <a href="https://item.taobao.com/item.htm?id=1002"><img src="x.jpg"></a>
          </div>
          <div class="cardContainer--x1"><span>广告位</span></div>
          <div class="cardContainer--x1">
            <a href="https://item.taobao.com/item.htm?id=1001">重复</a>
          </div>
        </body></html>
    "#;

    #[test]
    fn test_extract_from_card_containers() {
        let products = extract_products(CARD_PAGE);

        assert_eq!(
            products,
            vec![
                Product::new("原创亚克力立牌", "https://item.taobao.com/item.htm?id=1001"),
                Product::new("商品_1002", "https://item.taobao.com/item.htm?id=1002"),
            ]
        );
    }

    #[test]
    fn test_extract_from_generic_item_divs() {
        let html = r#"
            <div class="Item-wrapper">
              <a href="https://item.taobao.com/item.htm?id=2001">
                <span class="ItemTitle">金属书签</span>
              </a>
            </div>
            <div class="item-wrapper">
              <a href="https://item.taobao.com/item.htm?id=2002">
                <span>这是一个超过十个字符的长标题文本</span>
              </a>
            </div>
        "#;

        let products = extract_products(html);

        assert_eq!(products.len(), 2);
        assert_eq!(products[0].name, "金属书签");
        assert_eq!(products[1].name, "这是一个超过十个字符的长标题文本");
    }

    #[test]
    fn test_extract_falls_back_to_link_parents() {
        let html = r#"
            <section>
              <div><p><a href="https://item.taobao.com/item.htm?id=3001">透明贴纸</a></p></div>
              <ul><li><a href="https://item.taobao.com/item.htm?id=3002">no div</a></li></ul>
            </section>
        "#;

        let products = extract_products(html);

        assert_eq!(products, vec![Product::new("商品_3001", "https://item.taobao.com/item.htm?id=3001")]);
    }

    #[test]
    fn test_write_then_read_headered_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("products.csv");
        let products = vec![
            Product::new("立牌, 大号", "https://item.taobao.com/item.htm?id=1"),
            Product::new("徽章", "https://item.taobao.com/item.htm?id=2"),
        ];

        write_products(&path, &products).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("name,url\n"));
        assert_eq!(read_products(&path).unwrap(), products);
    }

    #[test]
    fn test_read_legacy_headerless_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("products_old.csv");
        std::fs::write(
            &path,
            "\u{feff}立牌,https://item.taobao.com/item.htm?id=1\n\n徽章,https://item.taobao.com/item.htm?id=2&a=b,c\nbroken line\n",
        )
        .unwrap();

        let products = read_products(&path).unwrap();

        assert_eq!(products.len(), 2);
        assert_eq!(products[0].name, "立牌");
        assert_eq!(products[1].url, "https://item.taobao.com/item.htm?id=2&a=b,c");
    }

    #[test]
    fn test_latest_product_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(latest_product_file(dir.path()), Err(AppError::NotFound { .. })));

        let older = dir.path().join("products_2025-01-01_00-00-00.csv");
        let newer = dir.path().join("products_2025-02-01_00-00-00.csv");
        std::fs::write(&older, "").unwrap();
        std::fs::write(dir.path().join("notes.csv"), "").unwrap();
        std::fs::write(&newer, "").unwrap();
        let past = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&older)
            .unwrap()
            .set_modified(past)
            .unwrap();

        assert_eq!(latest_product_file(dir.path()).unwrap(), newer);
        assert!(matches!(
            latest_product_file(&dir.path().join("missing")),
            Err(AppError::NotFound { .. })
        ));
    }

    #[test]
    fn test_extract_product_file_handles_non_utf8() {
        let dir = tempdir().unwrap();
        let html_path = dir.path().join("saved.html");
        let mut bytes = br#"<div class="card"><a href="https://item.taobao.com/item.htm?id=9">"#.to_vec();
        bytes.extend_from_slice(&[0xC4, 0xE3]);
        bytes.extend_from_slice(b"</a></div>");
        std::fs::write(&html_path, bytes).unwrap();
        let output = dir.path().join("out").join("products.csv");

        let products = extract_product_file(&html_path, &output).unwrap();

        assert_eq!(products.len(), 1);
        assert_eq!(products[0].url, "https://item.taobao.com/item.htm?id=9");
        assert!(output.exists());
    }
}
