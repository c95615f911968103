use crate::{
    entities::{product, Product, ProductModel},
    errors::ServiceError,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Derives the URL-safe slug for a product name: lowercased, every
/// maximal run of whitespace replaced with a single hyphen. Idempotent.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut in_whitespace = false;
    for c in name.to_lowercase().chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                slug.push('-');
            }
            in_whitespace = true;
        } else {
            slug.push(c);
            in_whitespace = false;
        }
    }
    slug
}

/// Input for creating a product. The slug and image URL are derived by
/// the handler before persistence is touched.
#[derive(Debug, Clone)]
pub struct CreateProductInput {
    pub name: String,
    pub slug: String,
    pub image: String,
}

/// Input for updating a product; `image` stays untouched when `None`.
#[derive(Debug, Clone)]
pub struct UpdateProductInput {
    pub name: String,
    pub slug: String,
    pub image: Option<String>,
}

/// Catalog service for managing products
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Full, unfiltered product set in persistence default order.
    pub async fn list_products(&self) -> Result<Vec<ProductModel>, ServiceError> {
        Product::find().all(&*self.db).await.map_err(Into::into)
    }

    /// Loads a product by primary key.
    pub async fn get_product(&self, id: i32) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<ProductModel>, ServiceError> {
        Product::find()
            .filter(product::Column::Slug.eq(slug))
            .one(&*self.db)
            .await
            .map_err(Into::into)
    }

    /// Rejects a slug already held by a product other than `exclude_id`.
    pub async fn ensure_unique_slug(
        &self,
        slug: &str,
        exclude_id: Option<i32>,
    ) -> Result<(), ServiceError> {
        if let Some(existing) = self.find_by_slug(slug).await? {
            if exclude_id != Some(existing.id) {
                return Err(ServiceError::Conflict(
                    "Product slug must be unique".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Inserts a new product with a fresh secondary identifier. Slug
    /// uniqueness at creation is enforced by the unique index.
    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        let product = product::ActiveModel {
            product_id: Set(Uuid::new_v4().to_string()),
            name: Set(input.name),
            slug: Set(input.slug),
            image: Set(input.image),
            ..Default::default()
        };

        let product = product.insert(&*self.db).await?;

        info!(id = product.id, slug = %product.slug, "created product");
        Ok(product)
    }

    /// Replaces name and slug, and the image URL when one is given.
    #[instrument(skip(self))]
    pub async fn update_product(
        &self,
        id: i32,
        input: UpdateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        let product = self.get_product(id).await?;
        let mut active: product::ActiveModel = product.into();

        active.name = Set(input.name);
        active.slug = Set(input.slug);
        if let Some(image) = input.image {
            active.image = Set(image);
        }

        let product = active.update(&*self.db).await?;

        info!(id = product.id, slug = %product.slug, "updated product");
        Ok(product)
    }

    /// Deletes a previously loaded product row.
    #[instrument(skip(self, product))]
    pub async fn delete_product(&self, product: ProductModel) -> Result<(), ServiceError> {
        let id = product.id;
        product.delete(&*self.db).await?;
        info!(id, "deleted product");
        Ok(())
    }
}
