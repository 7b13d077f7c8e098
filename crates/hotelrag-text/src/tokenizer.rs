use tantivy::tokenizer::{LowerCaser, StopWordFilter, TextAnalyzer, Token, TokenStream, Tokenizer};

/// Bumped whenever tokenization output changes; persisted indexes built with a
/// different version are rebuilt.
pub const TOKENIZER_VERSION: u32 = 1;

/// Characters that never carry meaning on their own in review text and split
/// Han runs before bigramming.
const HAN_PARTICLES: &[char] = &['的', '了', '吗', '呢', '吧', '啊', '呀', '和', '与', '很'];

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it", "its", "of", "on",
    "that", "the", "to", "was", "will", "with", "or", "but", "not", "this", "so", "if", "can", "do", "does",
    "我们", "你们", "他们", "这个", "那个", "就是", "还是", "但是", "因为", "所以", "如果", "非常", "比较",
    "一下", "一个", "可以", "没有", "什么", "怎么", "这里", "那里",
];

fn is_han(c: char) -> bool {
    matches!(c as u32, 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0x20000..=0x2A6DF)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() && !is_han(c)
}

/// Splits latin/digit words on non-alphanumerics and emits overlapping
/// bigrams for Han runs (a single isolated Han character is kept as-is).
#[derive(Clone, Default)]
pub struct HanBigramTokenizer {
    tokens: Vec<Token>,
}

pub struct HanBigramTokenStream<'a> {
    tokens: &'a mut Vec<Token>,
    cursor: usize,
}

impl Tokenizer for HanBigramTokenizer {
    type TokenStream<'a> = HanBigramTokenStream<'a>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> HanBigramTokenStream<'a> {
        self.tokens.clear();
        split_into(text, &mut self.tokens);
        HanBigramTokenStream { tokens: &mut self.tokens, cursor: 0 }
    }
}

impl TokenStream for HanBigramTokenStream<'_> {
    fn advance(&mut self) -> bool {
        self.cursor += 1;
        self.cursor <= self.tokens.len()
    }

    fn token(&self) -> &Token {
        &self.tokens[self.cursor - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.cursor - 1]
    }
}

fn push(out: &mut Vec<Token>, text: &str, from: usize, to: usize) {
    let position = out.len();
    out.push(Token { offset_from: from, offset_to: to, position, text: text[from..to].to_string(), position_length: 1 });
}

fn flush_han(out: &mut Vec<Token>, text: &str, run: &[(usize, char)]) {
    match run.len() {
        0 => {}
        1 => {
            let (start, c) = run[0];
            push(out, text, start, start + c.len_utf8());
        }
        _ => {
            for pair in run.windows(2) {
                let (start, _) = pair[0];
                let (second, c) = pair[1];
                push(out, text, start, second + c.len_utf8());
            }
        }
    }
}

fn split_into(text: &str, out: &mut Vec<Token>) {
    let mut han_run: Vec<(usize, char)> = Vec::new();
    let mut word_start: Option<usize> = None;

    for (idx, c) in text.char_indices() {
        if is_han(c) && !HAN_PARTICLES.contains(&c) {
            if let Some(start) = word_start.take() {
                push(out, text, start, idx);
            }
            han_run.push((idx, c));
        } else if is_word_char(c) {
            flush_han(out, text, &han_run);
            han_run.clear();
            word_start.get_or_insert(idx);
        } else {
            flush_han(out, text, &han_run);
            han_run.clear();
            if let Some(start) = word_start.take() {
                push(out, text, start, idx);
            }
        }
    }
    flush_han(out, text, &han_run);
    if let Some(start) = word_start {
        push(out, text, start, text.len());
    }
}

/// Analyzer used for both indexing and querying review text.
pub fn review_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(HanBigramTokenizer::default())
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
        .build()
}

/// Tokenize `text` with the review analyzer.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut analyzer = review_analyzer();
    let mut stream = analyzer.token_stream(text);
    let mut out = Vec::new();
    while stream.advance() {
        out.push(stream.token().text.clone());
    }
    out
}
