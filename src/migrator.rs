use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_users_table::Migration),
            Box::new(m20240101_000002_create_catalog_tables::Migration),
            Box::new(m20240101_000003_create_recipe_tables::Migration),
            Box::new(m20240101_000004_create_coupons_table::Migration),
            Box::new(m20240101_000005_create_cart_tables::Migration),
            Box::new(m20240101_000006_create_order_tables::Migration),
            Box::new(m20240101_000007_create_checkout_attempts_table::Migration),
        ]
    }
}

mod m20240101_000001_create_users_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Users::Email)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(ColumnDef::new(Users::Phone).string().null())
                        .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                        .col(ColumnDef::new(Users::Role).string_len(20).not_null())
                        .col(ColumnDef::new(Users::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Users::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_users_email")
                        .table(Users::Table)
                        .col(Users::Email)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Users {
        Table,
        Id,
        Email,
        Name,
        Phone,
        PasswordHash,
        Role,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Categories::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Categories::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Categories::Name)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Categories::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Price).decimal().not_null())
                        .col(ColumnDef::new(Products::Description).string().not_null())
                        .col(ColumnDef::new(Products::CategoryId).integer().not_null())
                        .col(ColumnDef::new(Products::ImageUrl).string().null())
                        .col(ColumnDef::new(Products::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp_with_time_zone().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_products_category")
                                .from(Products::Table, Products::CategoryId)
                                .to(Categories::Table, Categories::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_category_id")
                        .table(Products::Table)
                        .col(Products::CategoryId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Categories::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Categories {
        Table,
        Id,
        Name,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Name,
        Price,
        Description,
        CategoryId,
        ImageUrl,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_recipe_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_recipe_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Recipes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Recipes::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Recipes::Name).string().not_null())
                        .col(ColumnDef::new(Recipes::Price).decimal().not_null())
                        .col(ColumnDef::new(Recipes::Description).string().not_null())
                        .col(ColumnDef::new(Recipes::CategoryId).integer().not_null())
                        .col(ColumnDef::new(Recipes::ImageUrl).string().null())
                        .col(ColumnDef::new(Recipes::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Recipes::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Ingredients::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Ingredients::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Ingredients::Name)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RecipeIngredients::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RecipeIngredients::RecipeId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RecipeIngredients::IngredientId)
                                .integer()
                                .not_null(),
                        )
                        .primary_key(
                            Index::create()
                                .col(RecipeIngredients::RecipeId)
                                .col(RecipeIngredients::IngredientId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_recipe_ingredients_recipe")
                                .from(RecipeIngredients::Table, RecipeIngredients::RecipeId)
                                .to(Recipes::Table, Recipes::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_recipe_ingredients_ingredient")
                                .from(RecipeIngredients::Table, RecipeIngredients::IngredientId)
                                .to(Ingredients::Table, Ingredients::Id),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RecipeIngredients::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Ingredients::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Recipes::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Recipes {
        Table,
        Id,
        Name,
        Price,
        Description,
        CategoryId,
        ImageUrl,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Ingredients {
        Table,
        Id,
        Name,
    }

    #[derive(DeriveIden)]
    pub(super) enum RecipeIngredients {
        Table,
        RecipeId,
        IngredientId,
    }
}

mod m20240101_000004_create_coupons_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_coupons_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Coupons::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Coupons::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Coupons::DiscountAmount).decimal().not_null())
                        .col(ColumnDef::new(Coupons::MinAmount).decimal().not_null())
                        .col(ColumnDef::new(Coupons::CreatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Coupons {
        Table,
        Id,
        Code,
        DiscountAmount,
        MinAmount,
        CreatedAt,
    }
}

mod m20240101_000005_create_cart_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_cart_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CartHeaders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartHeaders::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartHeaders::UserId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(CartHeaders::CouponCode).string().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartDetails::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartDetails::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartDetails::CartHeaderId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartDetails::ProductId).integer().not_null())
                        .col(ColumnDef::new(CartDetails::Count).integer().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_details_header")
                                .from(CartDetails::Table, CartDetails::CartHeaderId)
                                .to(CartHeaders::Table, CartHeaders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cart_details_header_id")
                        .table(CartDetails::Table)
                        .col(CartDetails::CartHeaderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartDetails::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CartHeaders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum CartHeaders {
        Table,
        Id,
        UserId,
        CouponCode,
    }

    #[derive(DeriveIden)]
    pub(super) enum CartDetails {
        Table,
        Id,
        CartHeaderId,
        ProductId,
        Count,
    }
}

mod m20240101_000006_create_order_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderHeaders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderHeaders::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderHeaders::UserId).uuid().not_null())
                        .col(ColumnDef::new(OrderHeaders::CouponCode).string().null())
                        .col(ColumnDef::new(OrderHeaders::Discount).decimal().not_null())
                        .col(
                            ColumnDef::new(OrderHeaders::OrderTotal)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderHeaders::Name).string().not_null())
                        .col(ColumnDef::new(OrderHeaders::Phone).string().not_null())
                        .col(ColumnDef::new(OrderHeaders::Email).string().not_null())
                        .col(
                            ColumnDef::new(OrderHeaders::OrderTime)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderHeaders::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderHeaders::PaymentIntentId)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(OrderHeaders::SessionId).string().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_headers_user_id")
                        .table(OrderHeaders::Table)
                        .col(OrderHeaders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_headers_status")
                        .table(OrderHeaders::Table)
                        .col(OrderHeaders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderDetails::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderDetails::Id)
                                .integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderDetails::OrderHeaderId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderDetails::ProductId).integer().not_null())
                        .col(
                            ColumnDef::new(OrderDetails::ProductName)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderDetails::Price).decimal().not_null())
                        .col(ColumnDef::new(OrderDetails::Count).integer().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_details_header")
                                .from(OrderDetails::Table, OrderDetails::OrderHeaderId)
                                .to(OrderHeaders::Table, OrderHeaders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_details_header_id")
                        .table(OrderDetails::Table)
                        .col(OrderDetails::OrderHeaderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderDetails::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderHeaders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum OrderHeaders {
        Table,
        Id,
        UserId,
        CouponCode,
        Discount,
        OrderTotal,
        Name,
        Phone,
        Email,
        OrderTime,
        Status,
        PaymentIntentId,
        SessionId,
    }

    #[derive(DeriveIden)]
    pub(super) enum OrderDetails {
        Table,
        Id,
        OrderHeaderId,
        ProductId,
        ProductName,
        Price,
        Count,
    }
}

mod m20240101_000007_create_checkout_attempts_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000007_create_checkout_attempts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CheckoutAttempts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CheckoutAttempts::Key)
                                .string()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CheckoutAttempts::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(CheckoutAttempts::OrderHeaderId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutAttempts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CheckoutAttempts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum CheckoutAttempts {
        Table,
        Key,
        UserId,
        OrderHeaderId,
        CreatedAt,
    }
}
