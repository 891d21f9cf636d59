// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Textures that live in a shared atlas until a draw needs them on their own.

use alloc::rc::{Rc, Weak};
use core::cell::RefCell;
use core::fmt::{Debug, Formatter};

use log::debug;
use rectangle_map::Rectangle;

use crate::atlas::{AtlasOccupant, OccupantKey};
use crate::backend::{Backend, PixelFormat, Surface};
use crate::error::{AtlasError, AtlasErrorKind};
use crate::registry::{AtlasRegistry, SharedAtlas};

/// Width of the border reserved around atlased content.
///
/// The border holds a copy of the edge pixels so bilinear filtering at the edge of the
/// texture never picks up a neighbour.
const BORDER: u32 = 1;

/// Sampling needs of a draw, used by [`AtlasTexture::prepare_for_draw`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawRequirements {
    /// The draw samples mipmap levels.
    pub mipmap: bool,
    /// The draw samples outside a single quad, for example with repeating texture
    /// coordinates.
    pub non_quad: bool,
}

impl DrawRequirements {
    fn needs_own_surface(self) -> bool {
        self.mipmap || self.non_quad
    }
}

/// A texture stored in a shared atlas.
///
/// The texture follows its atlas through reorganizations, so [`rectangle`] and
/// [`surface`] always report the current location. Once it [migrates out] it owns a
/// standalone surface and never returns to an atlas.
///
/// Cloning yields another handle to the same texture. The atlas space is released when
/// the last handle is dropped.
///
/// [`rectangle`]: Self::rectangle
/// [`surface`]: Self::surface
/// [migrates out]: Self::migrate_out
pub struct AtlasTexture<B: Backend> {
    inner: Rc<TextureInner<B>>,
}

struct TextureInner<B: Backend> {
    format: PixelFormat,
    width: u32,
    height: u32,
    storage: RefCell<Storage<B>>,
}

struct Storage<B: Backend> {
    /// `None` once migrated out.
    atlas: Option<SharedAtlas<B>>,
    /// The reserved rectangle including the border while atlased, the whole surface
    /// afterwards.
    rect: Rectangle,
    surface: Option<Rc<B::Surface>>,
}

impl<B: Backend> AtlasTexture<B> {
    /// Creates a `width` × `height` texture in one of the registry's atlases.
    ///
    /// Only RGBA8 content can be atlased. The content is undefined until
    /// [`upload`](Self::upload) is called.
    pub fn new(
        registry: &AtlasRegistry<B>,
        backend: &mut B,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, AtlasError> {
        if !matches!(format, PixelFormat::Rgba8 | PixelFormat::Rgba8Premultiplied) {
            return Err(AtlasError::new(
                AtlasErrorKind::UnsupportedFormat(format),
                width,
                height,
            ));
        }
        if width == 0 || height == 0 {
            return Err(AtlasError::new(AtlasErrorKind::ZeroSized, width, height));
        }
        let padded = width
            .checked_add(2 * BORDER)
            .zip(height.checked_add(2 * BORDER))
            .ok_or(AtlasError::new(
                AtlasErrorKind::NoSupportedSize,
                width,
                height,
            ))?;

        let inner = Rc::new(TextureInner {
            format,
            width,
            height,
            storage: RefCell::new(Storage {
                atlas: None,
                rect: Rectangle::default(),
                surface: None,
            }),
        });
        let weak: Weak<TextureInner<B>> = Rc::downgrade(&inner);
        let occupant: Weak<dyn AtlasOccupant<B::Surface>> = weak;
        // The position and surface arrive through `position_changed` during the call.
        let (atlas, _) = registry.reserve(backend, padded.0, padded.1, occupant, OccupantKey(0))?;
        inner.storage.borrow_mut().atlas = Some(atlas);
        Ok(Self { inner })
    }

    /// Creates a texture in an atlas if possible, otherwise on its own surface.
    ///
    /// Returns `None` only if the backend cannot create a standalone surface either.
    pub fn new_or_standalone(
        registry: &AtlasRegistry<B>,
        backend: &mut B,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Option<Self> {
        match Self::new(registry, backend, width, height, format) {
            Ok(texture) => return Some(texture),
            Err(err) => debug!("Using a standalone surface: {err}"),
        }
        let surface = backend.create_surface(width, height, format, false)?;
        Some(Self {
            inner: Rc::new(TextureInner {
                format,
                width,
                height,
                storage: RefCell::new(Storage {
                    atlas: None,
                    rect: Rectangle::new(0, 0, width, height),
                    surface: Some(Rc::new(surface)),
                }),
            }),
        })
    }

    /// Pixel format of the content.
    pub fn format(&self) -> PixelFormat {
        self.inner.format
    }

    /// Size of the content, without the border.
    pub fn size(&self) -> (u32, u32) {
        (self.inner.width, self.inner.height)
    }

    /// Whether the texture still lives in an atlas.
    pub fn is_atlased(&self) -> bool {
        self.inner.storage.borrow().atlas.is_some()
    }

    /// The atlas holding the texture, if any.
    pub fn atlas(&self) -> Option<SharedAtlas<B>> {
        self.inner.storage.borrow().atlas.clone()
    }

    /// Where the content currently is in [`surface`](Self::surface).
    pub fn rectangle(&self) -> Rectangle {
        self.inner.content_rect(&self.inner.storage.borrow())
    }

    /// The surface currently holding the content.
    pub fn surface(&self) -> Option<Rc<B::Surface>> {
        self.inner.storage.borrow().surface.clone()
    }

    /// Normalized texture coordinates `[x1, y1, x2, y2]` of the content.
    pub fn texture_coords(&self) -> [f32; 4] {
        let storage = self.inner.storage.borrow();
        let Some(surface) = &storage.surface else {
            return [0.0, 0.0, 1.0, 1.0];
        };
        let rect = self.inner.content_rect(&storage);
        let (w, h) = (surface.width() as f32, surface.height() as f32);
        [
            rect.x as f32 / w,
            rect.y as f32 / h,
            rect.right() as f32 / w,
            rect.bottom() as f32 / h,
        ]
    }

    /// Writes the whole content.
    ///
    /// `data` holds `height` rows of `width` pixels in the texture's format, row `n`
    /// starting at byte `n * stride`. While atlased, the edge pixels are also written
    /// into the border.
    ///
    /// # Panics
    ///
    /// If `data` is too short for the texture size and `stride`.
    pub fn upload(&self, backend: &mut B, data: &[u8], stride: usize) {
        let (width, height) = self.size();
        if width == 0 || height == 0 {
            return;
        }
        let bpp = self.inner.format.bytes_per_pixel();
        let row = width as usize * bpp;
        assert!(
            data.len() >= (height as usize - 1) * stride + row,
            "{} bytes cannot hold a {width}x{height} texture with stride {stride}",
            data.len()
        );

        let storage = self.inner.storage.borrow();
        let Some(surface) = &storage.surface else {
            return;
        };
        let content = self.inner.content_rect(&storage);
        backend.upload_region(surface, content, data, stride);
        if storage.atlas.is_none() {
            return;
        }

        let last_row = (height as usize - 1) * stride;
        let last_column = (width as usize - 1) * bpp;
        let (x, y) = (content.x, content.y);
        // Left and right columns, then top and bottom rows.
        backend.upload_region(surface, Rectangle::new(x - 1, y, 1, height), data, stride);
        backend.upload_region(
            surface,
            Rectangle::new(content.right(), y, 1, height),
            &data[last_column..],
            stride,
        );
        backend.upload_region(surface, Rectangle::new(x, y - 1, width, 1), data, stride);
        backend.upload_region(
            surface,
            Rectangle::new(x, content.bottom(), width, 1),
            &data[last_row..],
            stride,
        );
    }

    /// Moves the content out of the atlas into a standalone surface.
    ///
    /// Does nothing if the texture already has its own surface. On failure the texture
    /// stays in the atlas.
    pub fn migrate_out(&self, backend: &mut B) -> Result<(), AtlasError> {
        let mut storage = self.inner.storage.borrow_mut();
        let Some(atlas) = storage.atlas.clone() else {
            return Ok(());
        };
        debug!("Migrating texture out of the atlas");
        let content = self.inner.content_rect(&storage);
        let copy = atlas.borrow().copy_rectangle(backend, content)?;
        atlas.borrow_mut().remove(&storage.rect);

        storage.atlas = None;
        storage.rect = Rectangle::new(0, 0, self.inner.width, self.inner.height);
        storage.surface = Some(Rc::new(copy));
        Ok(())
    }

    /// Makes the texture usable for a draw with the given requirements.
    ///
    /// Mipmapped or repeated sampling would read neighbouring atlas content, so such
    /// draws migrate the texture out first.
    pub fn prepare_for_draw(
        &self,
        backend: &mut B,
        requirements: DrawRequirements,
    ) -> Result<(), AtlasError> {
        if requirements.needs_own_surface() {
            self.migrate_out(backend)
        } else {
            Ok(())
        }
    }
}

impl<B: Backend> TextureInner<B> {
    fn content_rect(&self, storage: &Storage<B>) -> Rectangle {
        if storage.atlas.is_some() {
            Rectangle::new(
                storage.rect.x + BORDER,
                storage.rect.y + BORDER,
                self.width,
                self.height,
            )
        } else {
            storage.rect
        }
    }
}

impl<B: Backend> AtlasOccupant<B::Surface> for TextureInner<B> {
    fn position_changed(&self, _: OccupantKey, surface: &Rc<B::Surface>, rect: Rectangle) {
        let mut storage = self.storage.borrow_mut();
        storage.rect = rect;
        storage.surface = Some(surface.clone());
    }
}

impl<B: Backend> Drop for TextureInner<B> {
    fn drop(&mut self) {
        let storage = self.storage.get_mut();
        let Some(atlas) = storage.atlas.take() else {
            return;
        };
        let borrowed = atlas.try_borrow_mut();
        match borrowed {
            Ok(mut atlas) => {
                atlas.remove(&storage.rect);
            }
            // The atlas drops the rectangle at its next reorganization.
            Err(_) => debug!(
                "Texture at {:?} dropped while its atlas was in use; release deferred",
                storage.rect
            ),
        };
    }
}

impl<B: Backend> Clone for AtlasTexture<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: Backend> Debug for AtlasTexture<B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let storage = self.inner.storage.borrow();
        f.debug_struct("AtlasTexture")
            .field("format", &self.inner.format)
            .field("size", &(self.inner.width, self.inner.height))
            .field("rect", &storage.rect)
            .field("atlased", &storage.atlas.is_some())
            .finish_non_exhaustive()
    }
}
