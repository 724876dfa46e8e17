//! Streaming read engine.
//!
//! [`ReadEngine::read`] opens the mapping's sheet on a [`RowSource`] and
//! returns a lazy [`ReadItems`] iterator. The mapping's [`ReadStrategy`]
//! decides how rows are grouped into items; any error ends the iteration.

mod assemble;
mod heuristic;
mod pattern;
mod table;
mod window;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use gridbind_common::{DefaultConverter, ValueConverter};
use gridbind_io::RowSource;

pub use heuristic::{MAX_EMPTY_RUN, MAX_SCAN_ITEMS};

use self::assemble::ReadContext;
use self::heuristic::HeuristicReader;
use self::pattern::PatternReader;
use self::table::TableReader;
use self::window::RowWindow;
use crate::error::MappingError;
use crate::mapping::{CompiledMapping, ReadStrategy};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Skip the first source row.
    pub has_header: bool,
    /// Use this strategy instead of the compiled one.
    pub strategy: Option<ReadStrategy>,
}

pub struct ReadEngine<'m, T> {
    mapping: &'m CompiledMapping<T>,
    converter: Arc<dyn ValueConverter>,
    options: ReadOptions,
}

impl<'m, T> ReadEngine<'m, T> {
    pub fn new(mapping: &'m CompiledMapping<T>) -> Self {
        Self {
            mapping,
            converter: Arc::new(DefaultConverter),
            options: ReadOptions::default(),
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn ValueConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn read<S: RowSource>(&self, source: S) -> Result<ReadItems<'m, T, S>, MappingError> {
        self.open(source, None)
    }

    /// Like [`read`](Self::read); the iterator yields
    /// [`MappingError::Cancelled`] once `cancel_flag` is set.
    pub fn read_cancellable<'a, S: RowSource>(
        &self,
        source: S,
        cancel_flag: &'a AtomicBool,
    ) -> Result<ReadItems<'a, T, S>, MappingError>
    where
        'm: 'a,
    {
        self.open(source, Some(cancel_flag))
    }

    fn open<'a, S: RowSource>(
        &self,
        mut source: S,
        cancel: Option<&'a AtomicBool>,
    ) -> Result<ReadItems<'a, T, S>, MappingError>
    where
        'm: 'a,
    {
        let mapping: &'a CompiledMapping<T> = self.mapping;
        let strategy = self.options.strategy.unwrap_or(mapping.read_strategy);
        let bounds = mapping.boundaries;

        #[cfg(feature = "tracing")]
        let span = tracing::info_span!(
            "read_items",
            type_name = mapping.type_name(),
            sheet = mapping.sheet(),
            ?strategy
        );
        #[cfg(feature = "tracing")]
        let _guard = span.enter();

        source.open(mapping.sheet(), bounds.top_left(), self.options.has_header)?;
        let origin = bounds.min_row + u32::from(self.options.has_header);

        #[cfg(feature = "tracing")]
        tracing::debug!(origin, "source opened");

        let reader = match strategy {
            ReadStrategy::Table => Reader::Table(TableReader::new(origin)),
            ReadStrategy::RepeatingPattern => {
                let height = match bounds.pattern_height {
                    0 => mapping.item_spacing,
                    height => height,
                };
                Reader::Pattern(PatternReader::new(origin, height))
            }
            ReadStrategy::Heuristic => Reader::Heuristic(HeuristicReader::new(origin)),
        };

        #[cfg(feature = "tracing")]
        drop(_guard);

        Ok(ReadItems {
            window: RowWindow::new(source, origin, cancel),
            ctx: ReadContext {
                mapping,
                converter: Arc::clone(&self.converter),
                origin,
            },
            reader,
            done: false,
            #[cfg(feature = "tracing")]
            span,
        })
    }
}

/// Read every item of `mapping`'s sheet with default options.
pub fn read_items<T, S: RowSource>(
    mapping: &CompiledMapping<T>,
    source: S,
) -> Result<ReadItems<'_, T, S>, MappingError> {
    ReadEngine::new(mapping).read(source)
}

enum Reader<T> {
    Table(TableReader),
    Pattern(PatternReader<T>),
    Heuristic(HeuristicReader),
}

/// Lazy item iterator returned by [`ReadEngine::read`]. Yields each item as
/// soon as its rows are consumed; fused after the first error.
pub struct ReadItems<'a, T, S> {
    window: RowWindow<'a, S>,
    ctx: ReadContext<'a, T>,
    reader: Reader<T>,
    done: bool,
    #[cfg(feature = "tracing")]
    span: tracing::Span,
}

impl<T, S> ReadItems<'_, T, S> {
    /// Sheet row where the first item is expected.
    pub fn origin(&self) -> u32 {
        self.ctx.origin
    }

    pub fn strategy(&self) -> ReadStrategy {
        match self.reader {
            Reader::Table(_) => ReadStrategy::Table,
            Reader::Pattern(_) => ReadStrategy::RepeatingPattern,
            Reader::Heuristic(_) => ReadStrategy::Heuristic,
        }
    }
}

impl<T, S: RowSource> Iterator for ReadItems<'_, T, S> {
    type Item = Result<T, MappingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        #[cfg(feature = "tracing")]
        let _guard = self.span.enter();

        let next = match &mut self.reader {
            Reader::Table(r) => r.next_item(&mut self.window, &self.ctx),
            Reader::Pattern(r) => r.next_item(&mut self.window, &self.ctx),
            Reader::Heuristic(r) => r.next_item(&mut self.window, &self.ctx),
        };
        match next {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "read aborted");
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<T, S: RowSource> std::iter::FusedIterator for ReadItems<'_, T, S> {}
