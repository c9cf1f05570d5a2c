//! Static visual style per domain: generator mood, stock keywords and the
//! palette used by the local renderer and charts.

use image::Rgb;

use crate::worker::Domain;

pub const NAVY: Rgb<u8> = Rgb([0x1e, 0x3a, 0x5f]);
pub const BLUE: Rgb<u8> = Rgb([0x25, 0x63, 0xeb]);
pub const PURPLE: Rgb<u8> = Rgb([0x7c, 0x3a, 0xed]);

#[derive(Debug, Clone, Copy)]
pub struct VisualStyle {
    pub mood: &'static str,
    pub stock_keywords: &'static str,
    /// Gradient stops, left to right.
    pub palette: [Rgb<u8>; 3],
}

pub fn visual_style(domain: Domain) -> VisualStyle {
    let (mood, stock_keywords, palette) = match domain {
        Domain::Finance => (
            "corporate finance, charts, business graphs, blue and navy theme",
            "finance business chart investment",
            [NAVY, BLUE, Rgb([0x05, 0x96, 0x69])],
        ),
        Domain::Legal => (
            "legal, scales of justice, formal documents, dark wood tones",
            "law justice legal court",
            [Rgb([0x3b, 0x27, 0x1a]), Rgb([0x6b, 0x4f, 0x3a]), NAVY],
        ),
        Domain::Health => (
            "medical, healthcare, clean white and blue, clinical",
            "health medical healthcare",
            [Rgb([0x08, 0x91, 0xb2]), BLUE, Rgb([0xe0, 0xf2, 0xfe])],
        ),
        Domain::Aesthetics => (
            "beauty, spa, soft pastels, elegant and luxurious",
            "beauty spa aesthetics",
            [Rgb([0xdb, 0x27, 0x77]), Rgb([0xf9, 0xa8, 0xd4]), PURPLE],
        ),
        Domain::Education => (
            "education, books, learning, warm and inviting",
            "education learning school",
            [Rgb([0xd9, 0x77, 0x06]), Rgb([0xea, 0x58, 0x0c]), NAVY],
        ),
        Domain::Technology => (
            "technology, digital, futuristic, blue neon accents",
            "technology digital software",
            [Rgb([0x0f, 0x17, 0x2a]), BLUE, Rgb([0x06, 0xb6, 0xd4])],
        ),
        Domain::Training => (
            "fitness, training, dynamic, energetic colors",
            "training coaching professional",
            [Rgb([0xdc, 0x26, 0x26]), Rgb([0xea, 0x58, 0x0c]), Rgb([0xd9, 0x77, 0x06])],
        ),
        Domain::Protocol => (
            "protocol, clinical procedures, organized, clean",
            "protocol compliance standards",
            [Rgb([0x04, 0x78, 0x57]), Rgb([0x05, 0x96, 0x69]), BLUE],
        ),
        Domain::Marketing => (
            "marketing, creative, colorful, modern advertising",
            "marketing strategy branding",
            [PURPLE, Rgb([0xdb, 0x27, 0x77]), Rgb([0xea, 0x58, 0x0c])],
        ),
        Domain::Engineering => (
            "engineering, blueprints, technical, precise",
            "engineering architecture blueprint",
            [Rgb([0x1e, 0x40, 0xaf]), BLUE, Rgb([0x64, 0x74, 0x8b])],
        ),
        Domain::Other => (
            "professional, corporate, clean modern design",
            "business professional report",
            [NAVY, BLUE, PURPLE],
        ),
    };
    VisualStyle {
        mood,
        stock_keywords,
        palette,
    }
}

/// Prompt for the generative provider.
pub fn generator_prompt(topic: &str, domain: Domain, kind: &str) -> String {
    format!(
        "Professional {} for a business report about: {}. Style: {}. \
         Clean, modern design suitable for executive presentations. \
         High quality, photorealistic or high-end illustration. \
         No text, no watermarks, no logos. 16:9 aspect ratio composition.",
        kind,
        topic,
        visual_style(domain).mood
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_domain_has_a_style() {
        for domain in Domain::ALL {
            let style = visual_style(domain);
            assert!(!style.mood.is_empty());
            assert!(!style.stock_keywords.is_empty());
        }
    }

    #[test]
    fn test_generator_prompt_mentions_topic_and_mood() {
        let prompt = generator_prompt("Solar adoption", Domain::Finance, "professional infographic");
        assert!(prompt.contains("Solar adoption"));
        assert!(prompt.contains("corporate finance"));
        assert!(prompt.contains("No text"));
    }
}
