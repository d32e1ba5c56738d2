use bson::oid::ObjectId;
use chrono::Utc;
use mongodb::{bson::doc, Client, Collection};

use crate::error::Result;
use crate::models::User;

#[derive(Clone)]
pub struct UserRepository {
    collection: Collection<User>,
}

impl UserRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("users");
        Self { collection }
    }

    pub(crate) fn collection(&self) -> &Collection<User> {
        &self.collection
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let filter = doc! { "email": email };
        Ok(self.collection.find_one(filter).await?)
    }

    pub async fn create(
        &self,
        username: String,
        email: String,
        password_hash: String,
    ) -> Result<User> {
        let user = User {
            id: ObjectId::new(),
            username,
            email,
            password_hash,
            created_at: Utc::now(),
        };

        self.collection.insert_one(&user).await?;
        Ok(user)
    }
}
