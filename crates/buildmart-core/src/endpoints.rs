// ── Resource routes ──
//
// Paths are relative to the gateway's base URL, so none start with `/`.

use buildmart_api::Method;

use crate::model::EntityId;

/// Route table for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Human name used in messages ("Product").
    pub entity: String,
    /// Collection root (`products`).
    pub resource: String,
    /// List path relative to the root (`my-products`). Empty lists the root.
    pub list: String,
    /// Verb for `{id}/update`.
    pub update_method: Method,
}

impl Endpoints {
    pub fn new(entity: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            resource: resource.into().trim_matches('/').to_owned(),
            list: String::new(),
            update_method: Method::POST,
        }
    }

    /// The seller's product catalog.
    pub fn products() -> Self {
        Self::new("Product", "products").with_list("my-products")
    }

    #[must_use]
    pub fn with_list(mut self, list: impl Into<String>) -> Self {
        self.list = list.into().trim_matches('/').to_owned();
        self
    }

    /// Switch updates to `PATCH` (or any other verb the backend expects).
    #[must_use]
    pub fn with_update_method(mut self, method: Method) -> Self {
        self.update_method = method;
        self
    }

    pub fn list_path(&self) -> String {
        if self.list.is_empty() {
            self.resource.clone()
        } else {
            format!("{}/{}", self.resource, self.list)
        }
    }

    pub fn item_path(&self, id: EntityId) -> String {
        format!("{}/{id}", self.resource)
    }

    pub fn create_path(&self) -> String {
        self.resource.clone()
    }

    pub fn update_path(&self, id: EntityId) -> String {
        format!("{}/update", self.item_path(id))
    }

    pub fn delete_path(&self, id: EntityId) -> String {
        self.item_path(id)
    }

    pub fn upload_path(&self, id: EntityId) -> String {
        format!("{}/upload-files", self.item_path(id))
    }

    pub fn media_path(&self, id: EntityId, media_id: u64) -> String {
        format!("{}/media/{media_id}", self.item_path(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_routes() {
        let ep = Endpoints::products();
        let id = EntityId::Server(12);
        assert_eq!(ep.list_path(), "products/my-products");
        assert_eq!(ep.item_path(id), "products/12");
        assert_eq!(ep.create_path(), "products");
        assert_eq!(ep.update_path(id), "products/12/update");
        assert_eq!(ep.delete_path(id), "products/12");
        assert_eq!(ep.upload_path(id), "products/12/upload-files");
        assert_eq!(ep.media_path(id, 5), "products/12/media/5");
        assert_eq!(ep.update_method, Method::POST);
    }

    #[test]
    fn bare_resource_lists_its_root() {
        let ep = Endpoints::new("Category", "/categories/").with_update_method(Method::PATCH);
        assert_eq!(ep.list_path(), "categories");
        assert_eq!(ep.update_method, Method::PATCH);
    }
}
