use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Movie {
    pub owner_id: u64,
    pub title: String,
    pub year: i32,
    pub description: String,
    pub img_url: String,
}

/// A stored movie together with its id, as handed to templates.
#[derive(Serialize, Debug)]
pub struct ListedMovie<'a> {
    pub id: u64,
    #[serde(flatten)]
    pub movie: &'a Movie,
}
