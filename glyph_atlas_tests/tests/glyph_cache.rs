// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tests for the glyph cache on shared and private atlases.

use std::rc::Rc;

use glyph_atlas::backend::cpu::CpuBackend;
use glyph_atlas::{
    AtlasConfig, AtlasRegistry, AtlasTexture, GlyphCache, GlyphCacheConfig, PixelFormat,
    Rectangle, ReorganizePhase, Surface,
};

use crate::util::{BoxRasterizer, Event, EventLog, TestFont, assert_disjoint, assert_glyph_pixels};

type Cache = GlyphCache<TestFont, CpuBackend>;

fn shared_registry(initial_size: u32) -> AtlasRegistry<CpuBackend> {
    AtlasRegistry::with_config(
        PixelFormat::Rgba8Premultiplied,
        AtlasConfig {
            initial_size: Some(initial_size),
            ..AtlasConfig::default()
        },
    )
}

fn private_config(initial_size: u32) -> GlyphCacheConfig {
    GlyphCacheConfig {
        use_mipmapping: true,
        private_atlas: AtlasConfig {
            initial_size: Some(initial_size),
            ..GlyphCacheConfig::default().private_atlas
        },
        ..GlyphCacheConfig::default()
    }
}

/// Caches glyphs `1..=count` of `font` and checks that all of them end up drawn,
/// retrievable and non-overlapping.
fn fill_and_verify(cache: &Cache, backend: &mut CpuBackend, font: &Rc<TestFont>, count: u32) {
    for glyph in 1..=count {
        let value = cache
            .lookup(backend, &BoxRasterizer, font, glyph, true)
            .unwrap_or_else(|| panic!("glyph {glyph} could not be cached"));
        assert!(value.dirty, "new glyph {glyph} must be drawn");
    }
    assert_eq!(cache.len(), count as usize, "every glyph has an entry");
    assert_eq!(
        cache.cache_misses(),
        u64::from(count),
        "each first lookup is a miss"
    );

    cache.redraw_dirty_glyphs(backend, &BoxRasterizer);
    assert!(!cache.has_dirty_glyphs(), "redraw cleans every entry");

    let values: Vec<_> = (1..=count)
        .map(|glyph| {
            cache
                .lookup(backend, &BoxRasterizer, font, glyph, false)
                .unwrap_or_else(|| panic!("glyph {glyph} went missing"))
        })
        .collect();
    assert_eq!(
        cache.cache_hits(),
        u64::from(count),
        "each second lookup is a hit"
    );

    let surface = values[0].surface.clone().unwrap();
    let mut rects = Vec::new();
    for (glyph, value) in (1..=count).zip(&values) {
        assert!(!value.dirty, "glyph {glyph} is still dirty");
        assert!(
            Rc::ptr_eq(value.surface.as_ref().unwrap(), &surface),
            "glyph {glyph} is on an old surface"
        );
        assert_glyph_pixels(value, glyph);
        let (width, height) = (surface.width() as f32, surface.height() as f32);
        assert_eq!(
            value.tx1,
            value.tx_pixel as f32 / width,
            "left texture coordinate of glyph {glyph}"
        );
        assert_eq!(
            value.ty2,
            (value.ty_pixel + value.draw_height) as f32 / height,
            "bottom texture coordinate of glyph {glyph}"
        );
        rects.push(Rectangle::new(
            value.tx_pixel,
            value.ty_pixel,
            value.draw_width,
            value.draw_height,
        ));
    }
    assert_disjoint(&rects);
}

#[test]
fn glyph_cache_many_glyphs_in_shared_atlas() {
    let mut backend = CpuBackend::new();
    let registry = shared_registry(64);
    let cache = Cache::new(&registry, GlyphCacheConfig::default());
    let font = Rc::new(TestFont::new(32));

    fill_and_verify(&cache, &mut backend, &font, 200);
    assert_eq!(
        registry.atlases().len(),
        1,
        "one atlas grows to hold everything"
    );
    assert_eq!(cache.private_atlas_count(), 0);
    let atlas = registry.atlases()[0].clone();
    assert_eq!(atlas.borrow().len(), 200);
    assert!(atlas.borrow().size().0 > 64, "the atlas grew");
}

#[test]
fn glyph_cache_many_glyphs_in_private_atlas() {
    let mut backend = CpuBackend::new();
    let registry = shared_registry(64);
    let cache = Cache::new(&registry, private_config(64));
    let font = Rc::new(TestFont::new(32));

    fill_and_verify(&cache, &mut backend, &font, 200);
    assert!(
        registry.atlases().is_empty(),
        "mipmapped glyphs are never shared"
    );
    assert_eq!(cache.private_atlas_count(), 1);
    assert_eq!(
        backend.regions_copied(),
        0,
        "private atlases do not migrate"
    );
}

#[test]
fn glyph_cache_same_key_same_entry() {
    let mut backend = CpuBackend::new();
    let cache = Cache::new(&shared_registry(64), GlyphCacheConfig::default());
    let font = Rc::new(TestFont::new(8));
    let twin = Rc::new(TestFont::new(8));

    let a = cache
        .lookup(&mut backend, &BoxRasterizer, &font, 3, true)
        .unwrap();
    let b = cache
        .lookup(&mut backend, &BoxRasterizer, &font.clone(), 3, true)
        .unwrap();
    let c = cache
        .lookup(&mut backend, &BoxRasterizer, &twin, 3, true)
        .unwrap();
    assert_eq!(a.id, b.id);
    assert_ne!(a.id, c.id, "fonts are compared by identity");
    assert_eq!(cache.len(), 2);
    assert_eq!((cache.cache_hits(), cache.cache_misses()), (1, 2));
}

#[test]
fn glyph_cache_empty_glyph() {
    let mut backend = CpuBackend::new();
    let cache = Cache::new(&shared_registry(64), GlyphCacheConfig::default());
    let font = Rc::new(TestFont::new(8));

    let value = cache
        .lookup(&mut backend, &BoxRasterizer, &font, 0, true)
        .unwrap();
    assert!(value.surface.is_none());
    assert!(!value.dirty);
    assert_eq!((value.draw_width, value.draw_height), (0, 0));
    cache.set_dirty_glyphs(|_, glyph, _| panic!("glyph {glyph} has nothing to draw"));

    assert!(
        cache
            .lookup(&mut backend, &BoxRasterizer, &font, 0, false)
            .is_some()
    );
    assert_eq!(cache.cache_hits(), 1);
}

#[test]
fn glyph_cache_dirty_after_reorganization() {
    let mut backend = CpuBackend::new();
    let cache = Cache::new(&shared_registry(64), private_config(16));
    let font = Rc::new(TestFont::new(6));

    // Four 7x7 entries fit in 16x16.
    for glyph in 1..=4 {
        cache
            .lookup(&mut backend, &BoxRasterizer, &font, glyph, true)
            .unwrap();
    }
    let mut drawn = Vec::new();
    cache.set_dirty_glyphs(|_, glyph, value| {
        assert!(value.dirty, "the callback sees the dirty value");
        drawn.push(glyph);
    });
    drawn.sort_unstable();
    assert_eq!(drawn, [1, 2, 3, 4]);
    cache.set_dirty_glyphs(|_, glyph, _| panic!("glyph {glyph} was already drawn"));

    cache
        .lookup(&mut backend, &BoxRasterizer, &font, 5, true)
        .unwrap();
    let mut redrawn = Vec::new();
    cache.set_dirty_glyphs(|_, glyph, _| redrawn.push(glyph));
    redrawn.sort_unstable();
    assert_eq!(redrawn, [1, 2, 3, 4, 5], "every moved glyph is redrawn");
}

#[test]
fn glyph_cache_redraw_restores_unmigrated_pixels() {
    let mut backend = CpuBackend::new();
    let cache = Cache::new(&shared_registry(64), private_config(16));
    let font = Rc::new(TestFont::new(6));

    let first = cache
        .lookup(&mut backend, &BoxRasterizer, &font, 1, true)
        .unwrap();
    cache.redraw_dirty_glyphs(&mut backend, &BoxRasterizer);
    assert_glyph_pixels(&first, 1);

    for glyph in 2..=5 {
        cache
            .lookup(&mut backend, &BoxRasterizer, &font, glyph, true)
            .unwrap();
    }
    let moved = cache
        .lookup(&mut backend, &BoxRasterizer, &font, 1, false)
        .unwrap();
    assert!(moved.dirty);
    let surface = moved.surface.clone().unwrap();
    let ink = Rectangle::new(moved.tx_pixel, moved.ty_pixel, 6, 6);
    assert_eq!(surface.read_region(ink), vec![0; 36], "nothing was copied");

    cache.redraw_dirty_glyphs(&mut backend, &BoxRasterizer);
    assert_glyph_pixels(&moved, 1);
}

#[test]
fn glyph_cache_forwards_reorganize_notifications() {
    let mut backend = CpuBackend::new();
    let cache = Cache::new(&shared_registry(64), private_config(16));
    let log = EventLog::new();
    cache.subscribe(log.listener());
    let font = Rc::new(TestFont::new(6));

    cache
        .lookup(&mut backend, &BoxRasterizer, &font, 1, true)
        .unwrap();
    let phases = [
        Event::Phase(ReorganizePhase::Pre),
        Event::Phase(ReorganizePhase::Post),
    ];
    assert_eq!(log.take(), phases, "creating the atlas is a reorganization");

    for glyph in 2..=4 {
        cache
            .lookup(&mut backend, &BoxRasterizer, &font, glyph, true)
            .unwrap();
    }
    assert!(log.take().is_empty(), "direct fits do not reorganize");

    cache
        .lookup(&mut backend, &BoxRasterizer, &font, 5, true)
        .unwrap();
    assert_eq!(log.take(), phases);
}

#[test]
fn glyph_cache_unplaceable_glyph() {
    let mut backend = CpuBackend::with_max_surface_size(32);
    let cache = Cache::new(&shared_registry(32), GlyphCacheConfig::default());
    let huge = Rc::new(TestFont::new(40));
    let small = Rc::new(TestFont::new(4));

    assert!(
        cache
            .lookup(&mut backend, &BoxRasterizer, &huge, 1, true)
            .is_none()
    );
    assert!(cache.is_empty());
    assert!(
        cache
            .lookup(&mut backend, &BoxRasterizer, &huge, 1, false)
            .is_none()
    );
    assert!(
        cache
            .lookup(&mut backend, &BoxRasterizer, &small, 1, true)
            .is_some()
    );
    assert_eq!(cache.len(), 1);
}

#[test]
fn glyph_cache_falls_back_to_private_atlas() {
    let mut backend = CpuBackend::with_max_surface_size(32);
    let registry = shared_registry(32);
    let cache = Cache::new(&registry, GlyphCacheConfig::default());
    // With its border a 31x31 glyph needs 33x33 in a shared atlas, but only 32x32 in a
    // private one.
    let font = Rc::new(TestFont::new(31));

    let value = cache
        .lookup(&mut backend, &BoxRasterizer, &font, 1, true)
        .expect("a private atlas holds the glyph");
    assert!(
        registry.atlases().is_empty(),
        "no shared atlas could hold the glyph"
    );
    assert_eq!(cache.private_atlas_count(), 1, "one private atlas was created");
    assert!(value.dirty, "the new entry must be drawn");
    assert_eq!(
        (value.tx_pixel, value.ty_pixel),
        (0, 0),
        "private entries have no leading padding"
    );
    let surface = value.surface.clone().unwrap();
    assert_eq!(
        (surface.width(), surface.height(), surface.format()),
        (32, 32, PixelFormat::A8),
        "the private atlas uses the cache's format"
    );

    cache.redraw_dirty_glyphs(&mut backend, &BoxRasterizer);
    assert!(!cache.has_dirty_glyphs(), "redraw cleans the entry");
    assert_glyph_pixels(&value, 1);
    assert!(
        cache
            .lookup(&mut backend, &BoxRasterizer, &font, 1, false)
            .is_some_and(|cached| cached.id == value.id),
        "the fallback entry is cached"
    );
}

#[test]
fn glyph_cache_shares_atlas_with_textures() {
    let mut backend = CpuBackend::new();
    let registry = shared_registry(32);
    let cache = Cache::new(&registry, GlyphCacheConfig::default());
    let font = Rc::new(TestFont::new(8));

    let texture = AtlasTexture::new(
        &registry,
        &mut backend,
        10,
        10,
        PixelFormat::Rgba8Premultiplied,
    )
    .unwrap();
    let image = vec![0x42; 10 * 10 * 4];
    texture.upload(&mut backend, &image, 40);

    // Twelve 10x10 glyph reservations next to a 12x12 texture need a larger atlas.
    for glyph in 1..=12 {
        cache
            .lookup(&mut backend, &BoxRasterizer, &font, glyph, true)
            .unwrap();
    }
    cache.redraw_dirty_glyphs(&mut backend, &BoxRasterizer);

    assert_eq!(registry.atlases().len(), 1);
    let surface = texture.surface().unwrap();
    assert!(
        surface.width() * surface.height() > 32 * 32,
        "the atlas grew"
    );
    assert_eq!(
        surface.read_region(texture.rectangle()),
        image,
        "texture migrated"
    );

    let mut rects = vec![texture.rectangle()];
    for glyph in 1..=12 {
        let value = cache
            .lookup(&mut backend, &BoxRasterizer, &font, glyph, false)
            .unwrap();
        assert!(Rc::ptr_eq(value.surface.as_ref().unwrap(), &surface));
        assert_glyph_pixels(&value, glyph);
        rects.push(Rectangle::new(value.tx_pixel, value.ty_pixel, 8, 8));
    }
    assert_disjoint(&rects);
}

#[test]
fn glyph_cache_clear_releases_shared_space() {
    let mut backend = CpuBackend::new();
    let registry = shared_registry(64);
    let cache = Cache::new(&registry, GlyphCacheConfig::default());
    let font = Rc::new(TestFont::new(8));

    let texture =
        AtlasTexture::new(&registry, &mut backend, 4, 4, PixelFormat::Rgba8Premultiplied)
            .unwrap();
    for glyph in 1..=5 {
        cache
            .lookup(&mut backend, &BoxRasterizer, &font, glyph, true)
            .unwrap();
    }
    let atlas = texture.atlas().unwrap();
    assert_eq!(atlas.borrow().len(), 6);

    cache.clear();
    assert!(cache.is_empty());
    assert_eq!((cache.cache_hits(), cache.cache_misses()), (0, 0));
    assert_eq!(atlas.borrow().len(), 1, "only the texture remains");

    cache
        .lookup(&mut backend, &BoxRasterizer, &font, 1, true)
        .unwrap();
    assert_eq!(atlas.borrow().len(), 2);
    drop(cache);
    assert_eq!(
        atlas.borrow().len(),
        1,
        "dropping the cache releases its glyphs"
    );
}
