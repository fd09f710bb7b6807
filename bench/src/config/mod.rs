use rama::telemetry::tracing;

mod mock;
mod profile;
mod search;

pub use self::{mock::MockArgs, profile::Profile, search::SearchArgs};

macro_rules! merge_config {
    ($ty:ident, $profile:ident, $overwrite:ident, {$($property:ident),+ $(,)?}) => {
        $ty {
            $(
                $property: if let Some(value) = $overwrite.$property {
                    tracing::info!("property '{}': use overwrite: {value:?}", stringify!($property));
                    Some(value)
                } else if let Some(value) = $profile.$property {
                    tracing::info!("property '{}': use profile: {value:?}", stringify!($property));
                    Some(value)
                } else {
                    tracing::info!("property '{}': undefined", stringify!($property));
                    None
                },
            )+
        }
    };
}

fn profile_or_default(profile: Option<Profile>) -> Profile {
    match profile {
        Some(profile) => {
            tracing::info!("use profile to define base config: {profile:?}");
            profile
        }
        None => {
            let profile = Profile::default();
            tracing::info!("no profile defined, use default profile as base config: {profile:?}");
            profile
        }
    }
}

/// Merge manually defined search parameters on top of the profile ones.
pub fn merge_search_args(profile: Option<Profile>, config: Option<SearchArgs>) -> SearchArgs {
    let profile_cfg = profile_or_default(profile).search_args();
    let overwrite_cfg = config.unwrap_or_default();

    merge_config!(
        SearchArgs, profile_cfg, overwrite_cfg,
        {
            start_concurrency,
            max_concurrency,
            step,
            duration,
            burst_interval,
            fail_latency,
            queue_wait,
        }
    )
}

/// Merge manually defined mock behavior on top of the profile one.
pub fn merge_mock_args(profile: Option<Profile>, config: Option<MockArgs>) -> MockArgs {
    let profile_cfg = profile_or_default(profile).mock_args();
    let overwrite_cfg = config.unwrap_or_default();

    merge_config!(
        MockArgs, profile_cfg, overwrite_cfg,
        {
            base_latency,
            jitter,
            error_rate,
            stall_rate,
            stall_latency,
            capacity,
        }
    )
}
