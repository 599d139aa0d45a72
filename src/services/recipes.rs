use crate::{
    entities::{category, ingredient, recipe, recipe_ingredient},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Chef recipes with their ingredient lists. Ingredients are linkage
/// only; nothing is computed from them.
#[derive(Clone)]
pub struct RecipeService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRecipeInput {
    pub name: String,
    pub price: Decimal,
    pub description: String,
    pub category_id: i32,
    pub image_url: Option<String>,
    /// Ingredient names; unknown names are created on the fly
    pub ingredients: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpdateRecipeInput {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub description: Option<String>,
    pub category_id: Option<i32>,
    pub image_url: Option<Option<String>>,
    pub ingredients: Option<Vec<String>>,
}

/// Recipe together with its resolved ingredient names.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeWithIngredients {
    #[serde(flatten)]
    pub recipe: recipe::Model,
    pub ingredients: Vec<String>,
}

impl RecipeService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    pub async fn list_recipes(
        &self,
        category_id: Option<i32>,
    ) -> Result<Vec<RecipeWithIngredients>, ServiceError> {
        let mut query = recipe::Entity::find().order_by_asc(recipe::Column::Name);
        if let Some(category_id) = category_id {
            query = query.filter(recipe::Column::CategoryId.eq(category_id));
        }
        let recipes = query.all(&*self.db).await?;

        let mut out = Vec::with_capacity(recipes.len());
        for recipe in recipes {
            let ingredients = self.ingredient_names(recipe.id).await?;
            out.push(RecipeWithIngredients {
                recipe,
                ingredients,
            });
        }
        Ok(out)
    }

    pub async fn get_recipe(&self, id: i32) -> Result<RecipeWithIngredients, ServiceError> {
        let recipe = recipe::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("recipe {}", id)))?;
        let ingredients = self.ingredient_names(id).await?;
        Ok(RecipeWithIngredients {
            recipe,
            ingredients,
        })
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_recipe(
        &self,
        input: CreateRecipeInput,
    ) -> Result<RecipeWithIngredients, ServiceError> {
        category::Entity::find_by_id(input.category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("category {}", input.category_id)))?;

        let txn = self.db.begin().await?;

        let now = Utc::now();
        let created = recipe::ActiveModel {
            name: Set(input.name),
            price: Set(input.price),
            description: Set(input.description),
            category_id: Set(input.category_id),
            image_url: Set(input.image_url),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        link_ingredients(&txn, created.id, &input.ingredients).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::RecipeCreated(created.id))
            .await;
        info!("Created recipe {}", created.id);

        self.get_recipe(created.id).await
    }

    #[instrument(skip(self, input))]
    pub async fn update_recipe(
        &self,
        id: i32,
        input: UpdateRecipeInput,
    ) -> Result<RecipeWithIngredients, ServiceError> {
        let existing = recipe::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("recipe {}", id)))?;

        if let Some(category_id) = input.category_id {
            category::Entity::find_by_id(category_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("category {}", category_id)))?;
        }

        let txn = self.db.begin().await?;

        let mut active: recipe::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(category_id) = input.category_id {
            active.category_id = Set(category_id);
        }
        if let Some(image_url) = input.image_url {
            active.image_url = Set(image_url);
        }
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        if let Some(ingredients) = input.ingredients {
            recipe_ingredient::Entity::delete_many()
                .filter(recipe_ingredient::Column::RecipeId.eq(id))
                .exec(&txn)
                .await?;
            link_ingredients(&txn, id, &ingredients).await?;
        }

        txn.commit().await?;
        self.get_recipe(id).await
    }

    #[instrument(skip(self))]
    pub async fn delete_recipe(&self, id: i32) -> Result<(), ServiceError> {
        let existing = recipe::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("recipe {}", id)))?;

        let txn = self.db.begin().await?;
        recipe_ingredient::Entity::delete_many()
            .filter(recipe_ingredient::Column::RecipeId.eq(id))
            .exec(&txn)
            .await?;
        existing.delete(&txn).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn ingredient_names(&self, recipe_id: i32) -> Result<Vec<String>, ServiceError> {
        let links = recipe_ingredient::Entity::find()
            .filter(recipe_ingredient::Column::RecipeId.eq(recipe_id))
            .all(&*self.db)
            .await?;
        let ids: Vec<i32> = links.iter().map(|l| l.ingredient_id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = ingredient::Entity::find()
            .filter(ingredient::Column::Id.is_in(ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|i| i.name)
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Resolve ingredient names to rows, creating missing ones, and link them.
async fn link_ingredients<C: sea_orm::ConnectionTrait>(
    conn: &C,
    recipe_id: i32,
    names: &[String],
) -> Result<(), ServiceError> {
    for name in names {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            continue;
        }
        let existing = ingredient::Entity::find()
            .filter(ingredient::Column::Name.eq(trimmed))
            .one(conn)
            .await?;
        let ingredient_id = match existing {
            Some(row) => row.id,
            None => {
                ingredient::ActiveModel {
                    name: Set(trimmed.to_string()),
                    ..Default::default()
                }
                .insert(conn)
                .await?
                .id
            }
        };
        // Skip duplicates within the submitted list
        let already = recipe_ingredient::Entity::find()
            .filter(recipe_ingredient::Column::RecipeId.eq(recipe_id))
            .filter(recipe_ingredient::Column::IngredientId.eq(ingredient_id))
            .one(conn)
            .await?;
        if already.is_none() {
            recipe_ingredient::ActiveModel {
                recipe_id: Set(recipe_id),
                ingredient_id: Set(ingredient_id),
            }
            .insert(conn)
            .await?;
        }
    }
    Ok(())
}
