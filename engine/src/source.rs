use common::interface::NoticeSource;
use common::model::config::CrawlConfig;
use common::model::Notice;
use errors::{CrawlError, Result};
use log::{debug, warn};
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

/// Scrapes the legislative-notice index page of the National Assembly
/// pre-announcement portal. The listing is a plain table: number, subject
/// (with the detail link), proposer category, committee, posting period.
pub struct AssemblyNoticeSource {
    http: reqwest::Client,
    list_url: String,
    retries: usize,
}

struct IndexSelectors {
    row: Selector,
    cell: Selector,
    link: Selector,
}

fn sel(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| errors::Error::from(CrawlError::Parse(e.to_string())))
}

impl IndexSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            row: sel("table tbody tr")?,
            cell: sel("td")?,
            link: sel("a")?,
        })
    }
}

impl AssemblyNoticeSource {
    pub fn new(cfg: &CrawlConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| CrawlError::FetchFailed(e.into()))?;

        Ok(Self {
            http,
            list_url: cfg.list_url.clone(),
            retries: cfg.retries.max(1),
        })
    }

    async fn fetch_once(&self) -> Result<Vec<Notice>> {
        let response = self
            .http
            .get(&self.list_url)
            .send()
            .await
            .map_err(|e| CrawlError::FetchFailed(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Parse(format!("index returned http {}", status.as_u16())).into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| CrawlError::FetchFailed(e.into()))?;

        parse_index(&body, &self.list_url)
    }
}

#[async_trait::async_trait]
impl NoticeSource for AssemblyNoticeSource {
    async fn fetch_latest(&self) -> Result<Vec<Notice>> {
        let mut last_error: Option<errors::Error> = None;

        for attempt in 1..=self.retries {
            match self.fetch_once().await {
                Ok(notices) => return Ok(notices),
                Err(e) => {
                    warn!(
                        "Crawl attempt {attempt}/{} failed: {e}",
                        self.retries
                    );
                    last_error = Some(e);
                    if attempt < self.retries {
                        tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CrawlError::Timeout(self.retries).into()))
    }
}

/// Parses the listing table. Rows without a numeric first cell (header
/// spacers, "no results" rows) are skipped.
pub fn parse_index(html: &str, base_url: &str) -> Result<Vec<Notice>> {
    let selectors = IndexSelectors::new()?;
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let mut notices = Vec::new();
    for row in document.select(&selectors.row) {
        let cells: Vec<_> = row.select(&selectors.cell).collect();
        if cells.len() < 4 {
            continue;
        }

        let num_text = text_of(&cells[0]);
        let Ok(num) = num_text.parse::<i64>() else {
            debug!("Skipping index row with non-numeric num cell: {num_text:?}");
            continue;
        };

        let subject_cell = &cells[1];
        let subject = text_of(subject_cell);
        let link = subject_cell
            .select(&selectors.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| resolve_link(base.as_ref(), href))
            .unwrap_or_default();

        notices.push(Notice {
            num,
            subject,
            proposer_category: text_of(&cells[2]),
            committee: text_of(&cells[3]),
            link,
        });
    }

    if notices.is_empty() {
        return Err(CrawlError::EmptyIndex.into());
    }
    Ok(notices)
}

fn text_of(element: &scraper::ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve_link(base: Option<&Url>, href: &str) -> String {
    match base {
        Some(base) => base
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string()),
        None => href.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <html><body>
        <table class="board-list">
          <thead><tr><th>번호</th><th>제목</th><th>구분</th><th>위원회</th><th>기간</th></tr></thead>
          <tbody>
            <tr>
              <td>2210346</td>
              <td><a href="/napal/view.do?lgsltPaId=2210346">전기통신사업법 일부개정법률안</a></td>
              <td>의원</td>
              <td>과학기술정보방송통신위원회</td>
              <td>2026-07-30 ~ 2026-08-09</td>
            </tr>
            <tr>
              <td>2210345</td>
              <td><a href="/napal/view.do?lgsltPaId=2210345">개인정보 보호법 일부개정법률안</a></td>
              <td>정부</td>
              <td>정무위원회</td>
              <td>2026-07-29 ~ 2026-08-08</td>
            </tr>
            <tr>
              <td colspan="5">검색 결과가 없습니다.</td>
            </tr>
          </tbody>
        </table>
        </body></html>
    "#;

    #[test]
    fn parses_rows_and_resolves_links() {
        let notices =
            parse_index(SAMPLE, "https://pal.assembly.go.kr/napal/list.do").expect("should parse");
        assert_eq!(notices.len(), 2);

        assert_eq!(notices[0].num, 2210346);
        assert_eq!(notices[0].subject, "전기통신사업법 일부개정법률안");
        assert_eq!(notices[0].proposer_category, "의원");
        assert_eq!(notices[0].committee, "과학기술정보방송통신위원회");
        assert_eq!(
            notices[0].link,
            "https://pal.assembly.go.kr/napal/view.do?lgsltPaId=2210346"
        );
        assert_eq!(notices[1].num, 2210345);
    }

    #[test]
    fn empty_table_is_an_error() {
        let html = "<html><body><table><tbody></tbody></table></body></html>";
        let err = parse_index(html, "https://example.org").unwrap_err();
        assert!(err.is_crawl());
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let html = r#"
            <table><tbody>
              <tr><td>abc</td><td>x</td><td>y</td><td>z</td></tr>
              <tr><td>42</td><td><a href="/v?id=42">t</a></td><td>p</td><td>c</td></tr>
            </tbody></table>
        "#;
        let notices = parse_index(html, "https://example.org/list").unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].num, 42);
    }
}
