//! Server-rendered earnings table with sortable headers, period navigation
//! and a watchlist filter.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;

use crate::api::{fetch_entries, finish_listing, load_window, ApiError, ApiState, ListOptions};
use crate::date_range::{
    current_period, parse_quarter, parse_year, resolve_range, CalendarYear, DateRange, Quarter,
    RangeMode,
};
use crate::finnhub::CalendarQuery;
use crate::normalize::{normalize_batch, retain_known_symbols, NormalizedEarnings};
use crate::observability::{log_http_request, parse_bool};
use crate::sorting::{next_sort_state, SortDirection, SortField, SortState};
use crate::watchlist::Watchlist;

pub const DASHBOARD_HEADERS: [(&str, SortField); 7] = [
    ("Symbol", SortField::Symbol),
    ("Exchange", SortField::Exchange),
    ("Date", SortField::Date),
    ("Estimate", SortField::Estimate),
    ("Actual", SortField::Actual),
    ("Surprise", SortField::Surprise),
    ("Surprise %", SortField::SurprisePercent),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    Today,
    Tomorrow,
    #[default]
    Next30,
    Previous30,
    Search,
}

impl Period {
    pub const NAV: [Period; 4] = [
        Period::Today,
        Period::Tomorrow,
        Period::Next30,
        Period::Previous30,
    ];

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "today" => Some(Self::Today),
            "tomorrow" => Some(Self::Tomorrow),
            "next30" => Some(Self::Next30),
            "previous30" => Some(Self::Previous30),
            "search" => Some(Self::Search),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Tomorrow => "tomorrow",
            Self::Next30 => "next30",
            Self::Previous30 => "previous30",
            Self::Search => "search",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::Tomorrow => "Tomorrow",
            Self::Next30 => "Next 30 days",
            Self::Previous30 => "Previous 30 days",
            Self::Search => "Search",
        }
    }

    fn window(self) -> Option<RangeMode> {
        match self {
            Self::Today => Some(RangeMode::Today),
            Self::Tomorrow => Some(RangeMode::Tomorrow),
            Self::Next30 => Some(RangeMode::NextNDays(crate::api::WINDOW_DAYS)),
            Self::Previous30 => Some(RangeMode::PreviousNDays(crate::api::WINDOW_DAYS)),
            Self::Search => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardQuery {
    pub period: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
    pub watchlist: Option<String>,
    pub symbol: Option<String>,
    pub year: Option<String>,
    pub quarter: Option<String>,
}

/// Everything the page shows is derived from this value; transitions return
/// a new view and never mutate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DashboardView {
    pub period: Period,
    pub sort: SortState,
    pub watchlist_only: bool,
    pub symbol: Option<String>,
    pub year: Option<CalendarYear>,
    pub quarter: Option<Quarter>,
}

impl DashboardView {
    /// Unknown or malformed values fall back to defaults instead of failing the page.
    pub fn from_query(query: &DashboardQuery) -> Self {
        let get = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let sort = match get(&query.sort).as_deref().and_then(SortField::parse) {
            Some(field) => {
                let direction = get(&query.dir)
                    .as_deref()
                    .and_then(SortDirection::parse)
                    .unwrap_or(SortDirection::Asc);
                SortState::by(field, direction)
            }
            None => SortState::unsorted(),
        };

        let period = get(&query.period)
            .as_deref()
            .and_then(Period::parse)
            .unwrap_or_default();

        let mut view = Self {
            period,
            sort,
            watchlist_only: get(&query.watchlist)
                .as_deref()
                .and_then(parse_bool)
                .unwrap_or(false),
            ..Self::default()
        };

        if period == Period::Search {
            view.symbol = get(&query.symbol).map(|s| s.to_ascii_uppercase());
            view.year = get(&query.year).and_then(|y| parse_year(&y).ok());
            view.quarter = get(&query.quarter).as_deref().and_then(parse_quarter);
        }

        view
    }

    pub fn with_period(&self, period: Period) -> Self {
        let mut next = self.clone();
        next.period = period;
        if period != Period::Search {
            next.symbol = None;
            next.year = None;
            next.quarter = None;
        }
        next
    }

    pub fn with_sort_click(&self, field: SortField) -> Self {
        Self {
            sort: next_sort_state(self.sort, field),
            ..self.clone()
        }
    }

    pub fn with_watchlist_toggled(&self) -> Self {
        Self {
            watchlist_only: !self.watchlist_only,
            ..self.clone()
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("period", self.period.as_str().to_string())];
        if let Some(symbol) = &self.symbol {
            pairs.push(("symbol", symbol.clone()));
        }
        if let Some(year) = self.year {
            pairs.push(("year", year.to_string()));
        }
        if let Some(quarter) = self.quarter {
            pairs.push(("quarter", quarter.number().to_string()));
        }
        if let Some((field, direction)) = self.sort.active() {
            pairs.push(("sort", field.as_str().to_string()));
            pairs.push(("dir", direction.as_str().to_string()));
        }
        if self.watchlist_only {
            pairs.push(("watchlist", "true".to_string()));
        }
        pairs
    }

    pub fn href(&self) -> String {
        let mut url = Url::parse("http://dashboard.local/dashboard")
            .expect("static dashboard URL should parse");
        url.query_pairs_mut().extend_pairs(self.query_pairs());
        format!("/dashboard?{}", url.query().unwrap_or_default())
    }

    /// A search without a year covers the year and quarter containing
    /// `today`; those values are filled in so the form shows them.
    pub fn with_search_defaults(&self, today: chrono::NaiveDate) -> Self {
        if self.period != Period::Search || self.year.is_some() {
            return self.clone();
        }
        let (current_year, current_quarter) = current_period(today);
        Self {
            year: Some(current_year),
            quarter: Some(self.quarter.unwrap_or(current_quarter)),
            ..self.clone()
        }
    }

    pub fn search_range(&self, today: chrono::NaiveDate) -> DateRange {
        let view = self.with_search_defaults(today);
        let (current_year, _) = current_period(today);
        let year = view.year.unwrap_or(current_year);
        resolve_range(RangeMode::for_year(year, view.quarter), today)
    }
}

pub struct DashboardPage<'a> {
    pub view: &'a DashboardView,
    pub range: DateRange,
    pub rows: &'a [NormalizedEarnings],
    pub watchlist: &'a Watchlist,
}

pub fn format_money(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("${v:.2}"),
        None => "-".to_string(),
    }
}

pub fn format_surprise(value: Option<f64>) -> String {
    match value {
        Some(v) if v > 0.0 => format!("+{v:.2}"),
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    }
}

pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) if v > 0.0 => format!("+{v:.1}%"),
        Some(v) => format!("{v:.1}%"),
        None => "-".to_string(),
    }
}

fn signed_class(value: Option<f64>) -> &'static str {
    match value {
        Some(v) if v > 0.0 => "pos",
        Some(v) if v < 0.0 => "neg",
        _ => "",
    }
}

fn sort_indicator(view: &DashboardView, field: SortField) -> &'static str {
    match view.sort.active() {
        Some((active, SortDirection::Asc)) if active == field => " ▲",
        Some((active, SortDirection::Desc)) if active == field => " ▼",
        _ => "",
    }
}

pub fn render_dashboard_html(page: &DashboardPage<'_>) -> String {
    let view = page.view;
    let generated = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

    let mut out = String::new();
    out.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">\n");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    out.push_str("<title>Earnings Dashboard</title>\n");
    out.push_str("<style>:root{--bg:#f4f6f8;--card:#fff;--ink:#1b2329;--muted:#5f6a73;--line:#dde2e7;--head:#1d3540;--pos:#13795b;--neg:#b42318;--accent:#0c5f78}*{box-sizing:border-box}body{margin:0;color:var(--ink);font-family:\"Inter\",\"Segoe UI\",sans-serif;background:var(--bg)}.shell{max-width:1200px;margin:0 auto;padding:24px 18px}.hero{background:linear-gradient(135deg,#17323d,#2b6378);color:#f6fafb;border-radius:14px;padding:16px 20px}.hero h1{margin:0 0 6px;font-size:1.5rem}.hero-meta{display:flex;gap:16px;flex-wrap:wrap;font-size:.9rem;color:#d8e8ee}.nav{display:flex;gap:8px;flex-wrap:wrap;margin-top:14px}.nav a{padding:6px 12px;border-radius:8px;border:1px solid var(--line);background:#fff;color:var(--ink);text-decoration:none;font-size:.88rem}.nav a.active{background:var(--accent);color:#fff;border-color:var(--accent)}.search{display:flex;gap:8px;flex-wrap:wrap;margin-top:10px}.search input,.search select{padding:6px 8px;border:1px solid var(--line);border-radius:8px}.card{margin-top:14px;background:var(--card);border:1px solid var(--line);border-radius:14px;overflow:auto}table{width:100%;border-collapse:collapse}thead th{background:var(--head);text-align:left;padding:10px;font-size:.8rem;text-transform:uppercase;letter-spacing:.04em}thead th a{color:#f2f7f9;text-decoration:none}tbody td{padding:9px 10px;border-bottom:1px solid var(--line);font-size:.88rem;white-space:nowrap}tbody tr:nth-child(even){background:#fafbfc}.pos{color:var(--pos)}.neg{color:var(--neg)}.muted{color:var(--muted)}.star{border:none;background:none;cursor:pointer;font-size:1rem;color:#c7a008}.empty{padding:18px;color:var(--muted)}</style>\n");
    out.push_str("</head><body><main class=\"shell\">\n");

    out.push_str("<section class=\"hero\"><h1>Earnings Dashboard</h1><div class=\"hero-meta\">");
    out.push_str(&format!("<span>{}</span>", escape_html(view.period.label())));
    out.push_str(&format!(
        "<span>Range: {} to {}</span>",
        page.range.from_text(),
        page.range.to_text()
    ));
    out.push_str(&format!("<span>Rows: {}</span>", page.rows.len()));
    out.push_str(&format!("<span>Generated: {}</span>", escape_html(&generated)));
    out.push_str("</div></section>\n");

    out.push_str("<nav class=\"nav\">");
    for period in Period::NAV {
        let class = if view.period == period { "active" } else { "" };
        out.push_str(&format!(
            "<a class=\"{}\" href=\"{}\">{}</a>",
            class,
            escape_html(&view.with_period(period).href()),
            escape_html(period.label())
        ));
    }
    let toggle_label = if view.watchlist_only {
        "Hide watchlist"
    } else {
        "Show watchlist"
    };
    out.push_str(&format!(
        "<a id=\"watchlist-toggle\" class=\"{}\" href=\"{}\">{} ({} items)</a>",
        if view.watchlist_only { "active" } else { "" },
        escape_html(&view.with_watchlist_toggled().href()),
        toggle_label,
        page.watchlist.len()
    ));
    out.push_str("</nav>\n");

    render_search_form(&mut out, view);

    out.push_str("<section class=\"card\">");
    if page.rows.is_empty() {
        out.push_str("<div class=\"empty\">No earnings found for this period.</div>");
    }
    out.push_str("<table id=\"earnings-table\"><thead><tr><th></th>");
    for (label, field) in DASHBOARD_HEADERS {
        out.push_str(&format!(
            "<th data-field=\"{}\"><a href=\"{}\">{}{}</a></th>",
            field.as_str(),
            escape_html(&view.with_sort_click(field).href()),
            escape_html(label),
            sort_indicator(view, field)
        ));
    }
    out.push_str("</tr></thead><tbody>\n");

    for row in page.rows {
        let watched = page.watchlist.contains(&row.symbol);
        out.push_str("<tr>");
        out.push_str(&format!(
            "<td><button class=\"star\" data-symbol=\"{}\" data-watched=\"{}\" title=\"Toggle watchlist\">{}</button></td>",
            escape_html(&row.symbol),
            watched,
            if watched { "★" } else { "☆" }
        ));
        out.push_str(&format!(
            "<td title=\"{}\"><b>{}</b></td>",
            escape_html(row.description.as_deref().unwrap_or_default()),
            escape_html(&row.symbol)
        ));
        out.push_str(&format!(
            "<td>{}</td>",
            escape_html(row.exchange.as_deref().unwrap_or("-"))
        ));
        out.push_str(&format!("<td>{}</td>", escape_html(&row.date)));
        out.push_str(&format!("<td>{}</td>", format_money(row.estimate)));
        out.push_str(&format!("<td>{}</td>", format_money(row.actual)));
        out.push_str(&format!(
            "<td class=\"{}\">{}</td>",
            signed_class(row.surprise),
            format_surprise(row.surprise)
        ));
        out.push_str(&format!(
            "<td class=\"{}\">{}</td>",
            signed_class(row.surprise_percent),
            format_percent(row.surprise_percent)
        ));
        out.push_str("</tr>\n");
    }

    out.push_str("</tbody></table></section>\n");
    out.push_str("<script>document.querySelectorAll('button.star').forEach(function(btn){btn.addEventListener('click',function(){var method=btn.dataset.watched==='true'?'DELETE':'PUT';fetch('/api/watchlist/'+encodeURIComponent(btn.dataset.symbol),{method:method}).then(function(){window.location.reload();});});});</script>\n");
    out.push_str("</main></body></html>\n");
    out
}

fn render_search_form(out: &mut String, view: &DashboardView) {
    out.push_str("<form class=\"search\" method=\"get\" action=\"/dashboard\">");
    out.push_str("<input type=\"hidden\" name=\"period\" value=\"search\">");
    out.push_str(&format!(
        "<input name=\"symbol\" placeholder=\"Ticker\" value=\"{}\">",
        escape_html(view.symbol.as_deref().unwrap_or_default())
    ));
    out.push_str(&format!(
        "<input name=\"year\" placeholder=\"Year\" size=\"5\" value=\"{}\">",
        view.year.map(|y| y.to_string()).unwrap_or_default()
    ));
    out.push_str("<select name=\"quarter\"><option value=\"\">Full year</option>");
    for quarter in Quarter::ALL {
        let selected = if view.quarter == Some(quarter) {
            " selected"
        } else {
            ""
        };
        out.push_str(&format!(
            "<option value=\"{n}\"{selected}>Q{n}</option>",
            n = quarter.number()
        ));
    }
    out.push_str("</select>");
    if view.watchlist_only {
        out.push_str("<input type=\"hidden\" name=\"watchlist\" value=\"true\">");
    }
    out.push_str("<button type=\"submit\">Search</button></form>\n");
}

pub fn render_error_html(message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Earnings Dashboard</title></head><body><main><h1>Earnings Dashboard</h1><p class=\"error\">{}</p><p><a href=\"/dashboard\">Back</a></p></main></body></html>\n",
        escape_html(message)
    )
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

async fn load_view(
    state: &ApiState,
    view: &DashboardView,
) -> Result<(DateRange, Vec<NormalizedEarnings>), ApiError> {
    let (range, records) = match view.period.window() {
        Some(mode) => load_window(state, mode).await?,
        None => {
            let range = view.search_range(state.settings.anchor.today());
            let raws = match &view.symbol {
                Some(symbol) => {
                    fetch_entries(state, CalendarQuery::for_symbol(symbol.clone(), Some(range)))
                        .await?
                }
                None => retain_known_symbols(
                    fetch_entries(state, CalendarQuery::for_range(range)).await?,
                    state.tickers.as_ref(),
                ),
            };
            (range, normalize_batch(&raws, Some(state.tickers.as_ref())))
        }
    };

    let options = ListOptions {
        sort: view.sort,
        watchlist_only: view.watchlist_only,
    };
    Ok((range, finish_listing(state, records, options)))
}

pub(crate) async fn get_dashboard(
    State(state): State<ApiState>,
    Query(query): Query<DashboardQuery>,
) -> Response {
    let view =
        DashboardView::from_query(&query).with_search_defaults(state.settings.anchor.today());

    match load_view(&state, &view).await {
        Ok((range, rows)) => {
            let watchlist = state.watchlist.snapshot();
            log_http_request("/dashboard", StatusCode::OK.as_u16(), Some(rows.len()));
            Html(render_dashboard_html(&DashboardPage {
                view: &view,
                range,
                rows: &rows,
                watchlist: &watchlist,
            }))
            .into_response()
        }
        Err(err) => {
            let status = err.status();
            log_http_request("/dashboard", status.as_u16(), None);
            (status, Html(render_error_html(&err.public_message()))).into_response()
        }
    }
}
