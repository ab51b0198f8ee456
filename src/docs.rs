use serde_json::json;
use utoipa::openapi::path::{ParameterBuilder, ParameterIn};
use utoipa::openapi::schema::{ObjectBuilder, Schema, SchemaType};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::{RefOr, Required};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(title = "API", version = "1.0", description = "API docs"),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh,
        crate::users::handlers::get_me,
        crate::users::handlers::update_me,
        crate::users::handlers::delete_me,
        crate::users::handlers::get_user,
        crate::users::handlers::list_users,
        crate::files::handlers::upload,
        crate::files::handlers::download,
        crate::payment::handlers::webhook,
    ),
    components(schemas(
        crate::auth::dto::RegisterRequest,
        crate::auth::dto::LoginRequest,
        crate::auth::dto::RefreshRequest,
        crate::auth::dto::AuthResponse,
        crate::users::dto::UserDto,
        crate::users::dto::UpdateUserDto,
        crate::users::dto::UserListResponse,
        crate::files::dto::FileDto,
        crate::files::dto::FileResponse,
        crate::files::dto::FileUploadForm,
        crate::payment::dto::WebhookAck,
    )),
    tags(
        (name = "Auth", description = "Registration, login and tokens"),
        (name = "Users", description = "User accounts"),
        (name = "Files", description = "File uploads"),
        (name = "Payment", description = "Payment provider webhooks"),
    ),
    modifiers(&SecurityAddon, &LanguageHeader)
)]
pub struct ApiDoc;

/// Document with every path moved under the versioned prefix (e.g. `/api/v1`).
pub fn openapi(versioned_prefix: &str) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    let paths = std::mem::take(&mut doc.paths.paths);
    doc.paths.paths = paths
        .into_iter()
        .map(|(path, item)| (format!("{}{}", versioned_prefix, path), item))
        .collect();
    doc
}

/// Adds the JWT bearer security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Optional `x-custom-lang` header on every operation.
struct LanguageHeader;

impl Modify for LanguageHeader {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        for item in openapi.paths.paths.values_mut() {
            for op in item.operations.values_mut() {
                let schema = ObjectBuilder::new()
                    .schema_type(SchemaType::String)
                    .example(Some(json!("en")))
                    .build();
                let param = ParameterBuilder::new()
                    .name("x-custom-lang")
                    .parameter_in(ParameterIn::Header)
                    .required(Required::False)
                    .schema(Some(RefOr::T(Schema::Object(schema))))
                    .build();
                op.parameters.get_or_insert_with(Vec::new).push(param);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_prefixed() {
        let doc = openapi("/api/v1");
        assert!(doc.paths.paths.contains_key("/api/v1/users/me"));
        assert!(doc.paths.paths.contains_key("/api/v1/payment/webhook"));
        assert!(doc.paths.paths.keys().all(|p| p.starts_with("/api/v1/")));
    }

    #[test]
    fn lists_bearer_scheme_and_language_header() {
        let json = serde_json::to_value(openapi("/api/v1")).unwrap();
        assert_eq!(json["info"]["title"], "API");
        assert_eq!(json["info"]["version"], "1.0");
        assert_eq!(
            json["components"]["securitySchemes"]["bearer"]["scheme"],
            "bearer"
        );

        let params = &json["paths"]["/api/v1/users/me"]["get"]["parameters"];
        let has_lang = params
            .as_array()
            .unwrap()
            .iter()
            .any(|p| p["name"] == "x-custom-lang" && p["in"] == "header");
        assert!(has_lang);
    }

    #[test]
    fn user_schema_has_no_password() {
        let json = serde_json::to_value(openapi("/api/v1")).unwrap();
        let props = &json["components"]["schemas"]["UserDto"]["properties"];
        assert!(props.get("email").is_some());
        assert!(props.get("password").is_none());
    }
}
