use serde::Serialize;

/// Public profile page payload served at `GET /@handle`.
#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub handle: String,
    pub display_name: String,
    pub bio: String,
    pub avatar_url: Option<String>,
    pub links: Vec<PublicLink>,
}

#[derive(Debug, Serialize)]
pub struct PublicLink {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub avatar_url: String,
}
