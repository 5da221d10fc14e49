//! End-to-end identity dispatch tests
//!
//! These need a GPU adapter. When none is available, or the adapter cannot use
//! the format as a read-write storage texture, a test prints why and returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use texel_harness::{
    CommandSequence, ConfigError, ContextOptions, DeviceError, Error, GpuContext, Harness, IdentityRun, ImageDescriptor, ImageUsage, Kernel, ResourceLayoutDescription,
    SyncPolicy, Texel, TexelFormat,
};

fn context_with(sync: SyncPolicy) -> Option<GpuContext> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    match GpuContext::new_blocking(ContextOptions { sync, ..Default::default() }) {
        Ok(context) => Some(context),
        Err(e) => {
            eprintln!("skipping: {e}");
            None
        }
    }
}

fn context_for(format: TexelFormat) -> Option<GpuContext> {
    let context = context_with(SyncPolicy::default())?;
    if !context.supports_read_write_storage(format) {
        eprintln!("skipping: adapter lacks read-write storage for {format:?}");
        return None;
    }
    Some(context)
}

fn run<T: Texel>(context: &GpuContext, run: &IdentityRun<T>) -> texel_harness::RunReport {
    let kernel = Kernel::identity(T::FORMAT).unwrap();
    Harness::new(context, &kernel).run_identity(run).unwrap()
}

#[test]
fn test_filled_input_matches_expected_value() {
    let Some(context) = context_for(TexelFormat::R8Uint) else { return };

    let report = run(&context, &IdentityRun::uniform(32, 32, 255u8));
    assert_eq!(report.workgroups, [2, 2, 1]);
    assert_eq!(report.mismatches, 0);
}

#[test]
fn test_wrong_expected_value_mismatches_every_texel() {
    let Some(context) = context_for(TexelFormat::R8Uint) else { return };

    let report = run(
        &context,
        &IdentityRun {
            expected: 254u8,
            ..IdentityRun::uniform(32, 32, 255u8)
        },
    );
    assert_eq!(report.workgroups, [2, 2, 1]);
    assert_eq!(report.mismatches, 1024);
}

#[test]
fn test_filled_input_matches_expected_value_r32uint() {
    let Some(context) = context_for(TexelFormat::R32Uint) else { return };

    let report = run(&context, &IdentityRun::uniform(32, 32, 255u32));
    assert_eq!(report.workgroups, [2, 2, 1]);
    assert_eq!(report.texel_count(), 1024);
    assert_eq!(report.mismatches, 0);
    assert!(report.is_match());
}

#[test]
fn test_wrong_expected_value_mismatches_every_texel_r32uint() {
    let Some(context) = context_for(TexelFormat::R32Uint) else { return };

    let report = run(
        &context,
        &IdentityRun {
            expected: 254u32,
            ..IdentityRun::uniform(32, 32, 255u32)
        },
    );
    assert_eq!(report.workgroups, [2, 2, 1]);
    assert_eq!(report.mismatches, 1024);
    assert!(!report.is_match());
}

#[test]
fn test_unwritten_output_is_counted() {
    let Some(context) = context_for(TexelFormat::R32Uint) else { return };

    // Expecting the sentinel instead of the fill flags every texel the kernel wrote.
    let report = run(
        &context,
        &IdentityRun {
            width: 33,
            height: 17,
            fill: 1u32,
            expected: 2u32,
            sentinel: Some(2u32),
        },
    );
    assert_eq!(report.mismatches, 33 * 17);
}

#[test]
fn test_round_trip_extreme_values() {
    if let Some(context) = context_for(TexelFormat::R8Uint) {
        for value in [0u8, 1, 128, 255] {
            assert_eq!(run(&context, &IdentityRun::uniform(64, 16, value)).mismatches, 0, "value {value}");
        }
    }
    if let Some(context) = context_for(TexelFormat::R32Uint) {
        for value in [0u32, 255, u32::MAX] {
            assert_eq!(run(&context, &IdentityRun::uniform(16, 48, value)).mismatches, 0, "value {value}");
        }
    }
}

#[test]
fn test_uneven_extent_covers_every_texel() {
    let Some(context) = context_for(TexelFormat::R32Uint) else { return };

    for (width, height) in [(33, 17), (1, 1), (15, 40), (100, 3)] {
        let report = run(
            &context,
            &IdentityRun {
                sentinel: Some(0xDEAD_BEEF),
                ..IdentityRun::uniform(width, height, 7u32)
            },
        );
        assert_eq!(report.workgroups, [width.div_ceil(16), height.div_ceil(16), 1]);
        assert_eq!(report.mismatches, 0, "{width}x{height} left texels unwritten");
    }
}

#[test]
fn test_mismatched_resource_set_fails_before_dispatch() {
    let Some(context) = context_for(TexelFormat::R32Uint) else { return };
    let format = TexelFormat::R32Uint;

    let layout = context
        .create_resource_layout(&ResourceLayoutDescription::new().texture_read_only("InputTexture", format).texture_read_write("OutputTexture", format))
        .unwrap();

    let input = context
        .create_image(&ImageDescriptor::texture_2d("INPUT_TEX", 16, 16, format, ImageUsage::SAMPLED | ImageUsage::STORAGE))
        .unwrap();
    let sampled_only = context.create_image(&ImageDescriptor::texture_2d("SAMPLED_TEX", 16, 16, format, ImageUsage::SAMPLED)).unwrap();
    let input_view = input.create_view();
    let sampled_view = sampled_only.create_view();

    let err = context.create_resource_set(&layout, &[&input_view]).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::ResourceCountMismatch { expected: 2, actual: 1 })));

    let err = context.create_resource_set(&layout, &[&input_view, &sampled_view]).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::ResourceKindMismatch { slot: 1, .. })));

    // A sentinel written before the failed bindings survives untouched.
    context.fill(&sampled_only, 0, 9u32).unwrap();
    assert!(context.create_resource_set(&layout, &[&input_view, &sampled_view]).is_err());
    assert_eq!(context.count_texels_not_filled(&sampled_only, 0, 9u32).unwrap(), 0);
}

#[test]
fn test_resource_set_from_other_layout_is_rejected() {
    let Some(context) = context_for(TexelFormat::R32Uint) else { return };
    let format = TexelFormat::R32Uint;
    let description = ResourceLayoutDescription::new().texture_read_only("InputTexture", format).texture_read_write("OutputTexture", format);

    let layout = context.create_resource_layout(&description).unwrap();
    let other_layout = context.create_resource_layout(&description).unwrap();
    let kernel = Kernel::identity(format).unwrap();
    let pipeline = context.create_pipeline(&kernel, &layout, [16, 16, 1]).unwrap();

    let usage = ImageUsage::SAMPLED | ImageUsage::STORAGE;
    let input = context.create_image(&ImageDescriptor::texture_2d("INPUT_TEX", 16, 16, format, usage)).unwrap();
    let output = context.create_image(&ImageDescriptor::texture_2d("OUTPUT_TEX", 16, 16, format, usage)).unwrap();
    let (input_view, output_view) = (input.create_view(), output.create_view());
    let resource_set = context.create_resource_set(&other_layout, &[&input_view, &output_view]).unwrap();

    let mut sequence = CommandSequence::begin(&context, "mismatched");
    sequence.set_pipeline(&pipeline).unwrap();
    let err = sequence.set_resource_set(&resource_set).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::ResourceSetLayoutMismatch)));

    let err = sequence.dispatch([1, 1, 1]).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::NothingBound { missing: "resource set" })));
    assert!(sequence.is_empty());
}

#[test]
fn test_pipeline_rejects_wrong_workgroup_size() {
    let Some(context) = context_for(TexelFormat::R32Uint) else { return };
    let format = TexelFormat::R32Uint;

    let layout = context
        .create_resource_layout(&ResourceLayoutDescription::new().texture_read_only("InputTexture", format).texture_read_write("OutputTexture", format))
        .unwrap();
    let kernel = Kernel::identity(format).unwrap();

    let err = context.create_pipeline(&kernel, &layout, [8, 8, 1]).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::WorkgroupSizeMismatch { .. })));
}

#[test]
fn test_zero_workgroup_dispatch_is_rejected() {
    let Some(context) = context_for(TexelFormat::R32Uint) else { return };
    let format = TexelFormat::R32Uint;

    let layout = context
        .create_resource_layout(&ResourceLayoutDescription::new().texture_read_only("InputTexture", format).texture_read_write("OutputTexture", format))
        .unwrap();
    let kernel = Kernel::identity(format).unwrap();
    let pipeline = context.create_pipeline(&kernel, &layout, [16, 16, 1]).unwrap();

    let usage = ImageUsage::SAMPLED | ImageUsage::STORAGE;
    let input = context.create_image(&ImageDescriptor::texture_2d("INPUT_TEX", 16, 16, format, usage)).unwrap();
    let output = context.create_image(&ImageDescriptor::texture_2d("OUTPUT_TEX", 16, 16, format, usage)).unwrap();
    let (input_view, output_view) = (input.create_view(), output.create_view());
    let resource_set = context.create_resource_set(&layout, &[&input_view, &output_view]).unwrap();

    let mut sequence = CommandSequence::begin(&context, "zero");
    sequence.set_pipeline(&pipeline).unwrap();
    sequence.set_resource_set(&resource_set).unwrap();
    let err = sequence.dispatch([2, 0, 1]).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::ZeroWorkgroupCount { groups: [2, 0, 1] })));
}

#[test]
fn test_mapping_is_released_when_comparison_fails() {
    let Some(context) = context_with(SyncPolicy::default()) else { return };
    let format = TexelFormat::R32Uint;

    let image = context.create_image(&ImageDescriptor::texture_2d("SOURCE_TEX", 8, 8, format, ImageUsage::SAMPLED)).unwrap();
    context.fill(&image, 0, 3u32).unwrap();

    let staging = context.create_staging_for(&image).unwrap();
    let mut readback = context.copy_to_staging(&image, 0, staging).unwrap();

    {
        let mapped = readback.map::<u32>(&context).unwrap();
        let result = mapped.try_count_mismatches(|x, y, _| if (x, y) == (4, 4) { Err("comparison failed") } else { Ok(false) });
        assert_eq!(result, Err("comparison failed"));
    }

    // Mapping again only succeeds if the previous mapping was released.
    let mapped = readback.map::<u32>(&context).unwrap();
    assert_eq!(mapped.get(7, 7), Some(3));
    assert_eq!(mapped.count_mismatches(3), 0);
}

#[test]
fn test_map_rejects_wrong_texel_type() {
    let Some(context) = context_with(SyncPolicy::default()) else { return };

    let image = context
        .create_image(&ImageDescriptor::texture_2d("SOURCE_TEX", 4, 4, TexelFormat::R8Uint, ImageUsage::SAMPLED))
        .unwrap();
    context.fill(&image, 0, 1u8).unwrap();
    let staging = context.create_staging_for(&image).unwrap();
    let mut readback = context.copy_to_staging(&image, 0, staging).unwrap();

    let err = readback.map::<u32>(&context).err().unwrap();
    assert!(matches!(err, Error::Config(ConfigError::TexelTypeMismatch { .. })));
}

#[test]
fn test_staging_must_mirror_source() {
    let Some(context) = context_with(SyncPolicy::default()) else { return };

    let image = context
        .create_image(&ImageDescriptor::texture_2d("SOURCE_TEX", 8, 8, TexelFormat::R8Uint, ImageUsage::SAMPLED))
        .unwrap();
    let staging = context
        .create_staging(&ImageDescriptor::texture_2d("STAGING", 8, 4, TexelFormat::R8Uint, ImageUsage::STAGING))
        .unwrap();
    let err = context.copy_to_staging(&image, 0, staging).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::StagingMismatch { .. })));

    let err = context
        .create_staging(&ImageDescriptor::texture_2d("STAGING", 8, 8, TexelFormat::R8Uint, ImageUsage::STAGING | ImageUsage::SAMPLED))
        .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::InvalidUsage { .. })));
}

#[test]
fn test_oversized_staging_is_rejected() {
    let Some(context) = context_with(SyncPolicy::default()) else { return };

    let err = context
        .create_staging(&ImageDescriptor::texture_2d("STAGING", u32::MAX / 2, 1, TexelFormat::R32Uint, ImageUsage::STAGING))
        .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::ExtentTooLarge { .. })));

    let limit = context.device().limits().max_texture_dimension_2d;
    let err = context
        .create_image(&ImageDescriptor::texture_2d("INPUT_TEX", limit + 1, 1, TexelFormat::R32Uint, ImageUsage::SAMPLED))
        .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::ExtentTooLarge { .. })));
}

#[test]
fn test_upload_size_mismatch_is_rejected() {
    let Some(context) = context_with(SyncPolicy::default()) else { return };

    let image = context
        .create_image(&ImageDescriptor::texture_2d("INPUT_TEX", 32, 32, TexelFormat::R8Uint, ImageUsage::SAMPLED))
        .unwrap();
    let err = context.upload(&image, 0, &[255; 1000]).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::UploadSizeMismatch { expected: 1024, actual: 1000, .. })));
}

#[test]
fn test_wait_with_timeout_completes_idle_device() {
    let cancel = Arc::new(AtomicBool::new(false));
    let sync = SyncPolicy {
        timeout: Some(Duration::from_secs(30)),
        cancel: Some(cancel),
    };
    let Some(context) = context_with(sync) else { return };

    let image = context
        .create_image(&ImageDescriptor::texture_2d("SOURCE_TEX", 8, 8, TexelFormat::R32Uint, ImageUsage::SAMPLED))
        .unwrap();
    context.fill(&image, 0, 11u32).unwrap();
    assert_eq!(context.count_texels_not_filled(&image, 0, 11u32).unwrap(), 0);
}

#[test]
fn test_raised_cancel_flag_aborts_wait() {
    let cancel = Arc::new(AtomicBool::new(false));
    let sync = SyncPolicy {
        timeout: None,
        cancel: Some(Arc::clone(&cancel)),
    };
    let Some(context) = context_with(sync) else { return };

    let image = context
        .create_image(&ImageDescriptor::texture_2d("SOURCE_TEX", 8, 8, TexelFormat::R32Uint, ImageUsage::SAMPLED))
        .unwrap();
    context.fill(&image, 0, 5u32).unwrap();
    let staging = context.create_staging_for(&image).unwrap();
    let mut readback = context.copy_to_staging(&image, 0, staging).unwrap();

    cancel.store(true, Ordering::Release);
    let err = context.wait_for_idle().unwrap_err();
    assert!(matches!(err, Error::Device(DeviceError::Cancelled)));
    assert!(matches!(readback.map::<u32>(&context).err(), Some(Error::Device(DeviceError::Cancelled))));

    // Lowering the flag lets the same context wait again.
    cancel.store(false, Ordering::Release);
    context.wait_for_idle().unwrap();
}
