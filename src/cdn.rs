//! CDN path resolution (§6) and key slugification (§4.6).

use crate::model::Layer;

/// Lowercases `input`, collapses any run of characters outside `[a-z0-9]`
/// into a single `-`, and trims leading/trailing `-`.
#[must_use]
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_was_dash = false;
    for ch in input.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    slug.trim_matches('-').to_owned()
}

/// Derives the CDN URL for a layer that resolves from a type + key, or
/// `None` for layers that already carry an explicit URL or frame list.
#[must_use]
pub fn resolve_layer_url(asset_base_url: &str, layer: &Layer) -> Option<String> {
    let suffix = match layer {
        Layer::Background { .. } => "backgrounds/default.png".to_owned(),
        Layer::RoomBg { key, .. } => {
            let slug = slugify(key);
            let slug = if slug.is_empty() { "default".to_owned() } else { slug };
            format!("backgrounds/{slug}.png")
        }
        Layer::Floor { key, .. } => format!("floor/{}.png", slugify(key)),
        Layer::Furniture { key, .. } => format!("furniture/{}.png", slugify(key)),
        Layer::WallpaperLeft { key, .. } => format!("wallpaper/left/{}.png", slugify(key)),
        Layer::WallpaperRight { key, .. } => format!("wallpaper/right/{}.png", slugify(key)),
        Layer::Static { .. } | Layer::PetGifFrames { .. } => return None,
    };
    Some(format!("{asset_base_url}/{suffix}"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::model::Rect;

    #[rstest]
    #[case("Wood 01", "wood-01")]
    #[case("  leading and trailing  ", "leading-and-trailing")]
    #[case("ALLCAPS", "allcaps")]
    #[case("a---b", "a-b")]
    #[case("", "")]
    #[case("---", "")]
    fn slugify_matches_expected(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(expected, slugify(input));
    }

    #[test]
    fn background_resolves_to_default_path() {
        let layer = Layer::Background {
            key: String::new(),
            rect: Rect::default(),
        };
        assert_eq!(
            Some("https://cdn.example.com/backgrounds/default.png".to_owned()),
            resolve_layer_url("https://cdn.example.com", &layer)
        );
    }

    #[test]
    fn room_bg_with_empty_key_falls_back_to_default() {
        let layer = Layer::RoomBg {
            key: String::new(),
            rect: Rect::default(),
        };
        assert_eq!(
            Some("https://cdn.example.com/backgrounds/default.png".to_owned()),
            resolve_layer_url("https://cdn.example.com", &layer)
        );
    }

    #[test]
    fn floor_resolves_with_slugified_key() {
        let layer = Layer::Floor {
            key: "Wood 01".to_owned(),
            rect: Rect::default(),
        };
        assert_eq!(
            Some("https://cdn.example.com/floor/wood-01.png".to_owned()),
            resolve_layer_url("https://cdn.example.com", &layer)
        );
    }

    #[test]
    fn static_and_pet_gif_frames_have_no_derived_url() {
        assert_eq!(
            None,
            resolve_layer_url(
                "https://cdn.example.com",
                &Layer::Static {
                    url: "https://cdn.example.com/x.png".to_owned(),
                    rect: Rect::default(),
                }
            )
        );
        assert_eq!(
            None,
            resolve_layer_url(
                "https://cdn.example.com",
                &Layer::PetGifFrames { frames: vec![] }
            )
        );
    }
}
