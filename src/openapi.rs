use crate::models::{Author, Comment, CommentNode, Message, MessageDetail, MessagePage, MessageSummary, NewComment, NewMessage};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_messages,
        crate::routes::create_message,
        crate::routes::get_message,
        crate::routes::create_comment,
        crate::routes::auth_me,
    ),
    components(schemas(
        Author, Message, NewMessage, MessageSummary, MessagePage, MessageDetail,
        Comment, NewComment, CommentNode,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "messages", description = "Wishes"),
        (name = "comments", description = "Threaded blessings on a wish"),
        (name = "auth", description = "Caller identity"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}
