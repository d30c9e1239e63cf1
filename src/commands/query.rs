use std::collections::BTreeMap;

use anyhow::{Context, Result};
use evcal_core::FilterRequest;

use crate::config::AppConfig;
use crate::render::Render;
use crate::state::AppState;

/// Query options as given on the command line.
#[derive(Debug, Default)]
pub struct QueryArgs {
    pub search: Option<String>,
    pub scope: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub page: Option<i64>,
    pub past: bool,
    /// `group=id,id`
    pub categories: Vec<String>,
    /// `lat,lng`
    pub near: Option<String>,
    pub radius: Option<String>,
    pub unit: Option<String>,
}

pub fn run(config: AppConfig, args: QueryArgs) -> Result<()> {
    let request = build_request(args)?;
    let state = AppState::load(&config.server.data_path(), &config.engine)?;

    let page = state.engine.run(&request)?;
    println!("{}", page.render());
    Ok(())
}

fn build_request(args: QueryArgs) -> Result<FilterRequest> {
    let mut category_filter: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for selection in &args.categories {
        let (group, terms) = selection
            .split_once('=')
            .with_context(|| format!("Invalid category '{}', expected group=id,id", selection))?;
        category_filter
            .entry(group.trim().to_string())
            .or_default()
            .extend(terms.split(',').map(|t| t.trim().to_string()));
    }

    let (geo_lat, geo_lng) = match args.near.as_deref() {
        Some(near) => {
            let (lat, lng) = near
                .split_once(',')
                .with_context(|| format!("Invalid location '{}', expected lat,lng", near))?;
            (Some(lat.trim().to_string()), Some(lng.trim().to_string()))
        }
        None => (None, None),
    };

    Ok(FilterRequest {
        search: args.search,
        date_start: args.from,
        date_end: args.to,
        scope: args.scope,
        category_filter,
        page: args.page,
        past: args.past,
        geo_lat,
        geo_lng,
        geo_radius: args.radius,
        geo_radius_unit: args.unit,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_parses_categories_and_location() {
        let request = build_request(QueryArgs {
            categories: vec!["genre=jazz, blues".to_string(), "genre=folk".to_string()],
            near: Some("39.74, -104.99".to_string()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(request.category_filter["genre"], vec!["jazz", "blues", "folk"]);
        assert_eq!(request.geo_lat.as_deref(), Some("39.74"));
        assert_eq!(request.geo_lng.as_deref(), Some("-104.99"));
    }

    #[test]
    fn test_build_request_rejects_malformed_category() {
        let result = build_request(QueryArgs {
            categories: vec!["jazz".to_string()],
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
