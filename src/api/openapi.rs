use super::handlers::{admin, health, portal};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI document.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated `OpenAPI` document.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(portal::auth))
        .routes(routes!(portal::binauth_stage))
        .routes(routes!(portal::binauth_check))
        .routes(routes!(admin::session::login))
        .routes(routes!(admin::session::logout))
        .routes(routes!(admin::vouchers::add))
        .routes(routes!(admin::vouchers::delete))
        .routes(routes!(admin::vouchers::list))
        .routes(routes!(admin::password::change_password));

    let mut portal_tag = Tag::new("portal");
    portal_tag.description = Some("Voucher validation for captive portal clients".to_string());

    let mut admin_tag = Tag::new("admin");
    admin_tag.description = Some("Voucher management behind an admin session".to_string());

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Service and store health".to_string());

    router.get_openapi_mut().tags = Some(vec![portal_tag, admin_tag, health_tag]);

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    let Some(start) = author.find('<') else {
        let name = author.trim();
        return (if name.is_empty() { None } else { Some(name) }, None);
    };
    let name = author[..start].trim();
    let email = author[start + 1..].trim_end_matches('>').trim();
    (
        (!name.is_empty()).then_some(name),
        (!email.is_empty()).then_some(email),
    )
}
