//! 同城群组服务

use crate::app::backend::SelectRequest;
use crate::app::cache::{EntityTag, MutationOptions, QueryKey, QueryOptions, QueryResult};
use crate::app::city_group::models::{index_by_city, CityGroup};
use crate::app::client::AppContext;
use crate::app::error::SdkError;
use crate::app::types::decode_rows;
use anyhow::{Context, Result};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

const CITY_GROUPS_TABLE: &str = "city_groups";
const JOIN_RPC: &str = "join_city_group";
const LEAVE_RPC: &str = "leave_city_group";

pub struct CityGroupService {
    ctx: Arc<AppContext>,
}

impl CityGroupService {
    pub(crate) fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// 所有同城群组，按城市名索引
    pub async fn city_groups(&self) -> QueryResult<BTreeMap<String, CityGroup>> {
        let request = SelectRequest::new(CITY_GROUPS_TABLE).order("city_name", true);
        self.ctx
            .query
            .fetch(
                QueryOptions::new(QueryKey::new(EntityTag::CityGroup).part("all")),
                || async {
                    let rows = self
                        .ctx
                        .backend
                        .select(&request)
                        .await
                        .context("加载同城群组失败")?;
                    Ok::<_, anyhow::Error>(index_by_city(decode_rows::<CityGroup>(rows, "同城群组")?))
                },
            )
            .await
    }

    /// 当前用户是否在该城市群组中
    pub async fn is_member(&self, city: &str) -> Result<bool> {
        let me = self.ctx.require_user_id()?;
        let groups = self.city_groups().await.into_result()?;
        Ok(groups.get(city.trim()).map(|g| g.has_member(&me)).unwrap_or(false))
    }

    pub async fn join(&self, city: &str) -> Result<()> {
        self.call_membership_rpc(JOIN_RPC, city, "加入同城群组", "已加入同城群组")
            .await
    }

    pub async fn leave(&self, city: &str) -> Result<()> {
        self.call_membership_rpc(LEAVE_RPC, city, "退出同城群组", "已退出同城群组")
            .await
    }

    /// 切换成员身份，返回切换后是否为成员
    pub async fn toggle_membership(&self, city: &str) -> Result<bool> {
        if self.is_member(city).await? {
            self.leave(city).await?;
            Ok(false)
        } else {
            self.join(city).await?;
            Ok(true)
        }
    }

    async fn call_membership_rpc(
        &self,
        function: &str,
        city: &str,
        name: &str,
        success: &str,
    ) -> Result<()> {
        let me = self.ctx.require_user_id()?;
        let city = city.trim();
        if city.is_empty() {
            return Err(SdkError::InvalidInput("city name is empty".into()).into());
        }
        info!("[CityGroupSvc] {} {}: {}", me, name, city);

        self.ctx
            .query
            .mutate(
                MutationOptions::new(name, &[EntityTag::CityGroup]).success(success),
                || async {
                    self.ctx
                        .backend
                        .rpc(function, json!({ "p_city_name": city }))
                        .await
                        .with_context(|| format!("{}失败", name))?;
                    Ok(())
                },
            )
            .await
    }
}
