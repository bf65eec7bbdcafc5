// src/page/url.rs
//! Page classification from the URL the visitor is on.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

static SLUG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid slug pattern"));

const STATIC_PAGES: &[&str] = &["courses", "about", "contacts"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageInfo {
    CoursePage { slug: String },
    Static(String),
    Home,
}

impl PageInfo {
    pub fn slug(&self) -> Option<&str> {
        match self {
            PageInfo::CoursePage { slug } => Some(slug),
            _ => None,
        }
    }

    pub fn page_type(&self) -> &str {
        match self {
            PageInfo::CoursePage { .. } => "particular_course_page",
            PageInfo::Static(name) => name,
            PageInfo::Home => "home_page",
        }
    }
}

/// Last non-empty path segment; accepts absolute URLs or bare paths
fn last_segment(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

pub fn extract_page_info(url: &str) -> PageInfo {
    let segment = last_segment(url);
    if STATIC_PAGES.contains(&segment.as_str()) {
        return PageInfo::Static(segment);
    }
    if SLUG_PATTERN.is_match(&segment) {
        return PageInfo::CoursePage { slug: segment };
    }
    PageInfo::Home
}
