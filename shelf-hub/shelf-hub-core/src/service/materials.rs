use tracing::warn;
use uuid::Uuid;

use super::{ensure_batch, logged, MoveItemsInput, MoveManyOutcome, ShelfService};
use crate::access;
use crate::context::RequestContext;
use crate::error::Result;
use crate::search::{SearchConnection, SearchInput};
use crate::store::{Material, MaterialValues, NewMaterial, Options, SubShelf};
use crate::trash::TrashOutcome;

impl ShelfService {
    #[tracing::instrument(skip(self, ctx, input), fields(user_id = %ctx.user_id, parent = %input.parent_sub_shelf_id))]
    pub async fn create_material(&self, ctx: &RequestContext, input: &NewMaterial) -> Result<Material> {
        let result = self
            .write(ctx, |store| store.create_one_material(input, &Options::default()))
            .await;
        logged("create_material", result)
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn get_my_material_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<Material> {
        let result = self
            .read(ctx, |store| {
                store.check_permission_and_get_one_by_id(id, access::READ, &Options::default())
            })
            .await;
        logged("get_my_material_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx, values), fields(user_id = %ctx.user_id))]
    pub async fn update_my_material_by_id(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        values: &MaterialValues,
    ) -> Result<Material> {
        let result = self
            .write(ctx, |store| store.update_one_material_by_id(id, values, &Options::default()))
            .await;
        logged("update_my_material_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn delete_my_material_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<Material> {
        let result = self
            .write(ctx, |store| store.soft_delete_one_by_id::<Material>(id))
            .await;
        logged("delete_my_material_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn restore_my_material_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<Material> {
        let result = self
            .write(ctx, |store| store.restore_soft_deleted_one_by_id::<Material>(id))
            .await;
        logged("restore_my_material_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx, ids), fields(user_id = %ctx.user_id, count = ids.len()))]
    pub async fn delete_my_materials_by_ids(&self, ctx: &RequestContext, ids: &[Uuid]) -> Result<TrashOutcome> {
        let result = self
            .write(ctx, |store| store.soft_delete_many_by_ids::<Material>(ids))
            .await;
        logged("delete_my_materials_by_ids", result)
    }

    #[tracing::instrument(skip(self, ctx, ids), fields(user_id = %ctx.user_id, count = ids.len()))]
    pub async fn restore_my_materials_by_ids(&self, ctx: &RequestContext, ids: &[Uuid]) -> Result<TrashOutcome> {
        let result = self
            .write(ctx, |store| store.restore_soft_deleted_many_by_ids::<Material>(ids))
            .await;
        logged("restore_my_materials_by_ids", result)
    }

    #[tracing::instrument(skip(self, ctx, input), fields(user_id = %ctx.user_id, count = input.ids.len()))]
    pub async fn move_my_materials(&self, ctx: &RequestContext, input: &MoveItemsInput) -> Result<MoveManyOutcome> {
        let result = self
            .write(ctx, |store| {
                ensure_batch(store.limits(), input.ids.len())?;
                let destination: SubShelf = store.check_permission_and_get_one_by_id(
                    input.destination_sub_shelf_id,
                    access::WRITE,
                    &Options::default(),
                )?;
                let mut moved_ids = Vec::new();
                for &id in &input.ids {
                    let attempt = store
                        .check_permission_and_get_one_by_id::<Material>(id, access::WRITE, &Options::default())
                        .and_then(|material| store.move_material(&material, &destination));
                    match attempt {
                        Ok(()) => moved_ids.push(id),
                        Err(e) => warn!(material_id = %id, kind = %e.kind(), error = %e, "skipping material move"),
                    }
                }
                Ok(MoveManyOutcome {
                    updated_at: store.now(),
                    moved_ids,
                })
            })
            .await;
        logged("move_my_materials", result)
    }

    #[tracing::instrument(skip(self, ctx, input), fields(user_id = %ctx.user_id))]
    pub async fn search_my_materials(
        &self,
        ctx: &RequestContext,
        input: &SearchInput,
    ) -> Result<SearchConnection<Material>> {
        let result = self.read(ctx, |store| store.search_my_materials(input)).await;
        logged("search_my_materials", result)
    }
}
